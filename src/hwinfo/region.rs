//! Shared region sources
//!
//! A [`SharedRegion`] opens a read-only view of the producer's bytes for the
//! duration of one guarded read. The view is unmapped when dropped, before the
//! guard is released.

use crate::error::FetchError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A mapped, read-only view of the region
pub trait MappedView {
    /// The mapped bytes; may extend past the record
    fn as_bytes(&self) -> &[u8];
}

/// Something that can be mapped for one read
pub trait SharedRegion: Send {
    /// Open and map a view of the region
    fn map_view(&mut self) -> Result<Box<dyn MappedView + '_>, FetchError>;
}

/// View over owned bytes
#[derive(Debug, Clone)]
pub struct OwnedView(pub Vec<u8>);

impl MappedView for OwnedView {
    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Region held in process memory
///
/// Clones share the same bytes, so a test can keep a handle and
/// [`replace`](Self::replace) the contents while a reader owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegion {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl InMemoryRegion {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes)),
        }
    }

    /// Swap in new region contents
    pub fn replace(&self, bytes: Vec<u8>) {
        if let Ok(mut guard) = self.bytes.lock() {
            *guard = bytes;
        }
    }
}

impl SharedRegion for InMemoryRegion {
    fn map_view(&mut self) -> Result<Box<dyn MappedView + '_>, FetchError> {
        let guard = self
            .bytes
            .lock()
            .map_err(|_| FetchError::MappingFailure("region lock poisoned".to_string()))?;
        Ok(Box::new(OwnedView(guard.clone())))
    }
}

/// Region captured to a file, re-read on every mapping
///
/// Replacing the file between reads replays a changing producer.
#[derive(Debug, Clone)]
pub struct DumpFileRegion {
    path: PathBuf,
}

impl DumpFileRegion {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SharedRegion for DumpFileRegion {
    fn map_view(&mut self) -> Result<Box<dyn MappedView + '_>, FetchError> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            FetchError::MappingFailure(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(Box::new(OwnedView(bytes)))
    }
}

/// Region that never maps, for hosts where the producer cannot run
#[derive(Debug, Clone)]
pub struct UnavailableRegion {
    reason: String,
}

impl UnavailableRegion {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl SharedRegion for UnavailableRegion {
    fn map_view(&mut self) -> Result<Box<dyn MappedView + '_>, FetchError> {
        Err(FetchError::MappingFailure(self.reason.clone()))
    }
}
