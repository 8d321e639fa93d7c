//! Storage backend contract and an in-memory implementation.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::Sender;

use thiserror::Error;

use crate::storage::PathTemplate;
use crate::tree::StateTree;
use crate::xml::{self, XmlError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to {operation} {location}: {source}")]
    Io {
        operation: &'static str,
        location: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed state document at {location}: {source}")]
    Malformed {
        location: String,
        #[source]
        source: XmlError,
    },
    #[error("cannot resolve {location}: {reason}")]
    Unresolved { location: String, reason: String },
    #[error("cannot watch {location}: {reason}")]
    Watch { location: String, reason: String },
}

impl StorageError {
    pub fn io(operation: &'static str, location: &PathTemplate, source: io::Error) -> Self {
        StorageError::Io {
            operation,
            location: location.to_string(),
            source,
        }
    }

    pub fn malformed(location: &PathTemplate, source: XmlError) -> Self {
        StorageError::Malformed {
            location: location.to_string(),
            source,
        }
    }
}

/// 外部變更的種類。 / Kind of change observed at a watched location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Created,
    Removed,
}

/// 外部變更事件。 / A change made outside the engine to a persisted location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub location: PathTemplate,
    pub kind: ChangeKind,
}

/// Channel end handed to backends; events are drained on the owner thread.
pub type ChangeSink = Sender<ChangeEvent>;

/// 實體儲存的協作介面。 / Physical storage collaborator.
///
/// Locations are unresolved templates; implementations expand them. `write`
/// receives the fully merged document and must replace the previous content
/// atomically.
pub trait StorageBackend {
    /// `Ok(None)` when nothing is stored at `location`.
    fn read(&self, location: &PathTemplate) -> Result<Option<StateTree>, StorageError>;

    fn write(&mut self, location: &PathTemplate, document: &StateTree) -> Result<(), StorageError>;

    /// Removing a missing location is not an error.
    fn delete(&mut self, location: &PathTemplate) -> Result<(), StorageError>;

    fn exists(&self, location: &PathTemplate) -> bool;

    /// 監看位置的外部變更。 / Starts reporting external changes of `location` to `sink`.
    ///
    /// Returns `Ok(false)` when the backend cannot watch, in which case state is
    /// only loaded once at startup.
    fn watch(&mut self, location: &PathTemplate, sink: ChangeSink) -> Result<bool, StorageError> {
        let _ = (location, sink);
        Ok(false)
    }
}

/// 記憶體中的儲存後端。 / Backend keeping documents as XML text in memory.
///
/// Useful for tests and for hosts that persist elsewhere. External edits can
/// be simulated with [`MemoryBackend::replace_external`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: HashMap<PathTemplate, String>,
    sinks: HashMap<PathTemplate, Vec<ChangeSink>>,
    writes: usize,
    deletes: usize,
    fail_writes: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw text without notifying watchers.
    pub fn insert_raw(&mut self, location: &PathTemplate, text: impl Into<String>) {
        self.documents.insert(location.clone(), text.into());
    }

    pub fn raw(&self, location: &PathTemplate) -> Option<&str> {
        self.documents.get(location).map(String::as_str)
    }

    /// 模擬外部修改並通知監看者。 / Simulates an edit by another program and notifies watchers.
    pub fn replace_external(&mut self, location: &PathTemplate, text: impl Into<String>) {
        let kind = if self.documents.contains_key(location) {
            ChangeKind::Modified
        } else {
            ChangeKind::Created
        };
        self.documents.insert(location.clone(), text.into());
        self.notify(location, kind);
    }

    pub fn remove_external(&mut self, location: &PathTemplate) {
        if self.documents.remove(location).is_some() {
            self.notify(location, ChangeKind::Removed);
        }
    }

    /// Number of successful physical writes.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn delete_count(&self) -> usize {
        self.deletes
    }

    /// Makes every following write fail with a permission error.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn locations(&self) -> impl Iterator<Item = &PathTemplate> {
        self.documents.keys()
    }

    fn notify(&mut self, location: &PathTemplate, kind: ChangeKind) {
        if let Some(sinks) = self.sinks.get_mut(location) {
            sinks.retain(|sink| {
                sink.send(ChangeEvent {
                    location: location.clone(),
                    kind,
                })
                .is_ok()
            });
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, location: &PathTemplate) -> Result<Option<StateTree>, StorageError> {
        match self.documents.get(location) {
            Some(text) => xml::parse(text)
                .map(Some)
                .map_err(|source| StorageError::malformed(location, source)),
            None => Ok(None),
        }
    }

    fn write(&mut self, location: &PathTemplate, document: &StateTree) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::io(
                "write",
                location,
                io::Error::new(io::ErrorKind::PermissionDenied, "writes are disabled"),
            ));
        }
        let text = xml::to_document(document)
            .map_err(|source| StorageError::malformed(location, source))?;
        self.documents.insert(location.clone(), text);
        self.writes += 1;
        Ok(())
    }

    fn delete(&mut self, location: &PathTemplate) -> Result<(), StorageError> {
        if self.documents.remove(location).is_some() {
            self.deletes += 1;
        }
        Ok(())
    }

    fn exists(&self, location: &PathTemplate) -> bool {
        self.documents.contains_key(location)
    }

    fn watch(&mut self, location: &PathTemplate, sink: ChangeSink) -> Result<bool, StorageError> {
        self.sinks.entry(location.clone()).or_default().push(sink);
        Ok(true)
    }
}
