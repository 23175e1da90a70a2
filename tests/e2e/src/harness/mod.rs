//! A temp-file-backed `Storage` plus the handful of components each
//! scenario test needs, wired with a `NullScheduler` so ingestion never
//! spawns pipeline work the test doesn't ask for.

use std::sync::Arc;

use cairn_core::config::DaemonConfig;
use cairn_core::memory::MemoryStore;
use cairn_core::storage::Storage;
use tempfile::TempDir;

/// Owns the temp directory so the sqlite file outlives the test body.
pub struct TestDb {
    pub storage: Arc<Storage>,
    pub config: DaemonConfig,
    _dir: TempDir,
}

impl TestDb {
    pub fn open() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let db_path = dir.path().join("cairn-test.db");
        let storage = Arc::new(Storage::open(Some(db_path)).expect("open storage"));
        Self { storage, config: DaemonConfig::default(), _dir: dir }
    }

    pub fn store(&self) -> MemoryStore {
        MemoryStore::new(self.storage.clone(), &self.config)
    }
}
