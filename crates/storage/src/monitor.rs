use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::{EventKind, ModifyKind};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use statekeep_core::{ChangeEvent, ChangeKind, ChangeSink, PathTemplate};
use thiserror::Error;

/// 監控儲存位置時的錯誤。 / Errors raised while watching storage locations.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("failed to prepare directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} has no parent directory to watch")]
    NoParent(PathBuf),
    #[error("monitor registrations are poisoned")]
    Poisoned,
}

type Registrations = Arc<Mutex<HashMap<PathBuf, Vec<(PathTemplate, ChangeSink)>>>>;

/// 監看狀態檔案並轉發變更事件。 / Watches state documents and forwards their changes to the owner thread.
///
/// Parent directories are watched rather than the files themselves, so
/// documents created later and atomic renames are seen too.
pub struct StorageMonitor {
    watcher: RecommendedWatcher,
    registrations: Registrations,
    directories: HashSet<PathBuf>,
}

impl StorageMonitor {
    pub fn new() -> Result<Self, MonitorError> {
        let registrations: Registrations = Arc::default();
        let shared = Arc::clone(&registrations);
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => dispatch(&shared, event),
                Err(err) => tracing::warn!(error = %err, "storage watcher reported an error"),
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            registrations,
            directories: HashSet::new(),
        })
    }

    /// 開始監看實體檔案。 / Reports changes of `path` as events for `location`.
    ///
    /// The parent directory is created when missing.
    pub fn watch(
        &mut self,
        path: &Path,
        location: PathTemplate,
        sink: ChangeSink,
    ) -> Result<(), MonitorError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .ok_or_else(|| MonitorError::NoParent(path.to_path_buf()))?;
        fs::create_dir_all(parent).map_err(|source| MonitorError::Directory {
            path: parent.to_path_buf(),
            source,
        })?;

        let directory = normalize(parent);
        if !self.directories.contains(&directory) {
            self.watcher.watch(parent, RecursiveMode::NonRecursive)?;
            self.directories.insert(directory);
        }

        let key = normalize(path);
        tracing::debug!(path = %key.display(), %location, "watching state document");
        self.registrations
            .lock()
            .map_err(|_| MonitorError::Poisoned)?
            .entry(key)
            .or_default()
            .push((location, sink));
        Ok(())
    }

    pub fn watched_directories(&self) -> usize {
        self.directories.len()
    }
}

fn dispatch(registrations: &Registrations, event: notify::Event) {
    let Some(kind) = map_kind(&event.kind) else {
        return;
    };
    let Ok(mut registrations) = registrations.lock() else {
        return;
    };
    for path in &event.paths {
        let key = normalize(path);
        if let Some(targets) = registrations.get_mut(&key) {
            targets.retain(|(location, sink)| {
                sink.send(ChangeEvent {
                    location: location.clone(),
                    kind,
                })
                .is_ok()
            });
        }
    }
}

fn map_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

/// Resolves symlinks in the parent so watcher paths and registered paths agree.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
