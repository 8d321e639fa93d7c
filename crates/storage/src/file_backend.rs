use std::fs;
use std::io;
use std::path::PathBuf;

use statekeep_core::{xml, ChangeSink, PathTemplate, StateTree, StorageBackend, StorageError};

use crate::config::StorageConfig;
use crate::monitor::StorageMonitor;
use crate::paths::PathRoots;
use crate::util::write_atomic;

/// 以檔案系統保存狀態文件的後端。 / Backend keeping state documents as XML files on disk.
pub struct FileBackend {
    roots: PathRoots,
    temp_suffix: String,
    watch_enabled: bool,
    monitor: Option<StorageMonitor>,
}

impl FileBackend {
    pub fn new(roots: PathRoots) -> Self {
        Self {
            roots,
            temp_suffix: "tmp".to_string(),
            watch_enabled: true,
            monitor: None,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            roots: config.paths.clone(),
            temp_suffix: config.temp_suffix.clone(),
            watch_enabled: config.watch,
            monitor: None,
        }
    }

    /// Disables change notifications; state is then loaded once.
    pub fn without_watching(mut self) -> Self {
        self.watch_enabled = false;
        self
    }

    pub fn roots(&self) -> &PathRoots {
        &self.roots
    }

    pub fn resolve(&self, location: &PathTemplate) -> Result<PathBuf, StorageError> {
        self.roots.expand(location)
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, location: &PathTemplate) -> Result<Option<StateTree>, StorageError> {
        let path = self.resolve(location)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::io("read", location, err)),
        };
        if text.trim().is_empty() {
            tracing::debug!(path = %path.display(), "state document is empty");
            return Ok(None);
        }
        xml::parse(&text)
            .map(Some)
            .map_err(|source| StorageError::malformed(location, source))
    }

    fn write(&mut self, location: &PathTemplate, document: &StateTree) -> Result<(), StorageError> {
        let path = self.resolve(location)?;
        let text = xml::to_document(document)
            .map_err(|source| StorageError::malformed(location, source))?;
        write_atomic(&path, text.as_bytes(), &self.temp_suffix)
            .map_err(|err| StorageError::io("write", location, err))?;
        tracing::debug!(path = %path.display(), bytes = text.len(), "wrote state document");
        Ok(())
    }

    fn delete(&mut self, location: &PathTemplate) -> Result<(), StorageError> {
        let path = self.resolve(location)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "deleted state document");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io("delete", location, err)),
        }
    }

    fn exists(&self, location: &PathTemplate) -> bool {
        self.resolve(location)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn watch(&mut self, location: &PathTemplate, sink: ChangeSink) -> Result<bool, StorageError> {
        if !self.watch_enabled {
            return Ok(false);
        }
        let path = self.resolve(location)?;
        let watch_error = |reason: String| StorageError::Watch {
            location: location.to_string(),
            reason,
        };

        if self.monitor.is_none() {
            let monitor = StorageMonitor::new().map_err(|err| watch_error(err.to_string()))?;
            self.monitor = Some(monitor);
        }
        if let Some(monitor) = self.monitor.as_mut() {
            monitor
                .watch(&path, location.clone(), sink)
                .map_err(|err| watch_error(err.to_string()))?;
        }
        Ok(true)
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("roots", &self.roots)
            .field("temp_suffix", &self.temp_suffix)
            .field("watch_enabled", &self.watch_enabled)
            .field("watching", &self.monitor.is_some())
            .finish()
    }
}
