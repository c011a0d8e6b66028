//! Durable handle storage implementations.
//!
//! The browser analog is per-origin durable storage holding a single
//! identifier and timestamp. Failures never propagate: a broken store reads
//! as "no handle", which simply forces recreation.

use beacon_protocol::{HandleStore, StoredHandle};
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::warn;

/// In-memory store: one tab lifetime, nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryHandleStore {
    handle: Mutex<Option<StoredHandle>>,
}

impl HandleStore for MemoryHandleStore {
    fn load(&self) -> Option<StoredHandle> {
        self.handle.lock().clone()
    }

    fn save(&self, handle: &StoredHandle) {
        *self.handle.lock() = Some(handle.clone());
    }

    fn clear(&self) {
        *self.handle.lock() = None;
    }
}

/// JSON-file-backed store surviving process restarts.
#[derive(Debug)]
pub struct FileHandleStore {
    path: PathBuf,
}

impl FileHandleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HandleStore for FileHandleStore {
    fn load(&self) -> Option<StoredHandle> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(handle) => Some(handle),
            Err(error) => {
                warn!(%error, path = %self.path.display(), "stored handle unreadable; discarding");
                None
            }
        }
    }

    fn save(&self, handle: &StoredHandle) {
        if let Some(parent) = self.path.parent()
            && let Err(error) = std::fs::create_dir_all(parent)
        {
            warn!(%error, path = %self.path.display(), "handle dir creation failed");
            return;
        }
        let payload = match serde_json::to_string_pretty(handle) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "handle serialization failed");
                return;
            }
        };
        if let Err(error) = std::fs::write(&self.path, payload) {
            warn!(%error, path = %self.path.display(), "handle write failed");
        }
    }

    fn clear(&self) {
        if let Err(error) = std::fs::remove_file(&self.path)
            && error.kind() != std::io::ErrorKind::NotFound
        {
            warn!(%error, path = %self.path.display(), "handle removal failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_protocol::SessionId;
    use chrono::Utc;

    fn handle() -> StoredHandle {
        StoredHandle {
            session_id: SessionId::from_string("S1"),
            last_refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHandleStore::new(dir.path().join("beacon/handle.json"));
        assert!(store.load().is_none());

        let saved = handle();
        store.save(&saved);
        assert_eq!(store.load().unwrap(), saved);

        store.clear();
        assert!(store.load().is_none());
        // Clearing twice is quiet.
        store.clear();
    }

    #[test]
    fn corrupt_file_reads_as_no_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handle.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileHandleStore::new(&path);
        assert!(store.load().is_none());
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryHandleStore::default();
        assert!(store.load().is_none());
        let saved = handle();
        store.save(&saved);
        assert_eq!(store.load().unwrap(), saved);
        store.clear();
        assert!(store.load().is_none());
    }
}
