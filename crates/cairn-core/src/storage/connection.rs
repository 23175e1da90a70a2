//! The embedded database handle: a writer connection guarded by a mutex
//! (single-writer per process, per spec.md §5) and a separate reader
//! connection for non-transactional lookups.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::{Connection, OpenFlags};

use super::migrations::apply_migrations;
use crate::error::{CoreError, Result};

pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

static MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -64000;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA mmap_size = 268435456;",
    )
}

impl Storage {
    /// Open (creating if needed) the database at `path`. A `None` path opens
    /// an in-memory database, useful for tests that don't need a `TempDir`.
    ///
    /// In-memory databases use a uniquely-named shared-cache URI so the
    /// writer and reader connections see the same database — a second bare
    /// `:memory:` connection would otherwise be a distinct, empty database.
    pub fn open(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => {
                let writer = Connection::open(&path)?;
                configure_connection(&writer)?;
                apply_migrations(&writer)?;
                let reader = Connection::open(&path)?;
                configure_connection(&reader)?;
                Ok(Self { writer: Mutex::new(writer), reader: Mutex::new(reader), path })
            }
            None => {
                let id = MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
                let uri = format!("file:cairn-mem-{id}?mode=memory&cache=shared");
                let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI;

                let writer = Connection::open_with_flags(&uri, flags)?;
                configure_connection(&writer)?;
                apply_migrations(&writer)?;
                let reader = Connection::open_with_flags(&uri, flags)?;
                configure_connection(&reader)?;

                Ok(Self { writer: Mutex::new(writer), reader: Mutex::new(reader), path: PathBuf::from(":memory:") })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside an IMMEDIATE transaction on the writer connection.
    /// Per spec.md §5, no suspension point (external IO) may occur inside
    /// this closure — callers must resolve LLM/embed calls before or after.
    pub fn write_txn<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.writer.lock().expect("writer mutex poisoned");
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Run `f` against the read-only connection, outside any transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.reader.lock().expect("reader mutex poisoned");
        Ok(f(&conn)?)
    }

    /// Run `f` against the writer connection without starting a new
    /// transaction, for callers that manage their own (e.g. the retention
    /// sweeper's per-step transactions).
    pub fn write<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.writer.lock().expect("writer mutex poisoned");
        Ok(f(&conn)?)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.path).finish()
    }
}

/// Helper used throughout `cairn_core` to convert a closure error when the
/// conversion target (`CoreError`) isn't already `rusqlite::Error`.
pub fn corruption(msg: impl Into<String>) -> CoreError {
    CoreError::Corruption(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema() {
        let storage = Storage::open(None).unwrap();
        let count: i64 = storage
            .read(|conn| conn.query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0)))
            .unwrap();
        assert!(count >= 3);
    }

    #[test]
    fn fts_table_exists() {
        let storage = Storage::open(None).unwrap();
        storage
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM memories_fts", [], |r| r.get::<_, i64>(0))
            })
            .unwrap();
    }
}
