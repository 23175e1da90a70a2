//! Retention sweeper: purges tombstoned memories and stale history/job rows
//! in a fixed, ordered sequence of short transactions (spec.md §4.2).
//!
//! `DELETE ... LIMIT` isn't available on the bundled SQLite build, so each
//! step selects a batch of ids first and deletes them by id.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;

use crate::config::RetentionConfig;
use crate::error::Result;
use crate::graph::decrement_entity_mentions;
use crate::storage::Storage;

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub memories_purged: usize,
    pub history_rows_purged: usize,
    pub completed_jobs_purged: usize,
    pub dead_jobs_purged: usize,
}

/// Runs one full sweep: expired tombstones (mentions, embeddings, the
/// memory row itself), then aged history rows, then aged completed/dead
/// jobs. Each step is its own transaction bounded by `batch_limit`.
pub fn sweep(storage: &Arc<Storage>, config: &RetentionConfig) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    report.memories_purged = purge_expired_tombstones(storage, config)?;
    report.history_rows_purged = purge_aged_rows(
        storage,
        "memory_history",
        "created_at",
        config.history,
        config.batch_limit,
    )?;
    report.completed_jobs_purged = purge_aged_jobs(storage, "completed", config.completed_job, config.batch_limit)?;
    report.dead_jobs_purged = purge_aged_jobs(storage, "dead", config.dead_job, config.batch_limit)?;
    Ok(report)
}

fn purge_expired_tombstones(storage: &Arc<Storage>, config: &RetentionConfig) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::from_std(config.tombstone).unwrap_or_default()).to_rfc3339();

    let ids: Vec<String> = storage.read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM memories WHERE is_deleted = 1 AND deleted_at IS NOT NULL AND deleted_at < ?1 LIMIT ?2",
        )?;
        stmt.query_map(params![cutoff, config.batch_limit as i64], |r| r.get(0))?.collect()
    })?;

    if ids.is_empty() {
        return Ok(0);
    }

    storage.write_txn(|tx| {
        for id in &ids {
            let entity_ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT entity_id FROM memory_entity_mentions WHERE memory_id = ?1")?;
                stmt.query_map(params![id], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?
            };
            tx.execute("DELETE FROM memory_entity_mentions WHERE memory_id = ?1", params![id])?;
            for entity_id in &entity_ids {
                decrement_entity_mentions(tx, entity_id)?;
            }
            tx.execute("DELETE FROM embeddings WHERE source_type = 'memory' AND source_id = ?1", params![id])?;
            tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        }
        Ok(())
    })?;

    Ok(ids.len())
}

fn purge_aged_rows(
    storage: &Arc<Storage>,
    table: &str,
    time_column: &str,
    max_age: std::time::Duration,
    batch_limit: usize,
) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default()).to_rfc3339();

    let ids: Vec<String> = storage.read(|conn| {
        let sql = format!("SELECT id FROM {table} WHERE {time_column} < ?1 LIMIT ?2");
        let mut stmt = conn.prepare(&sql)?;
        stmt.query_map(params![cutoff, batch_limit as i64], |r| r.get(0))?.collect()
    })?;

    if ids.is_empty() {
        return Ok(0);
    }

    storage.write_txn(|tx| {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM {table} WHERE id IN ({placeholders})");
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        tx.execute(&sql, params.as_slice())?;
        Ok(())
    })?;

    Ok(ids.len())
}

fn purge_aged_jobs(
    storage: &Arc<Storage>,
    status: &str,
    max_age: std::time::Duration,
    batch_limit: usize,
) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default()).to_rfc3339();
    let time_column = if status == "completed" { "completed_at" } else { "failed_at" };

    let ids: Vec<String> = storage.read(|conn| {
        let sql = format!("SELECT id FROM memory_jobs WHERE status = ?1 AND {time_column} < ?2 LIMIT ?3");
        let mut stmt = conn.prepare(&sql)?;
        stmt.query_map(params![status, cutoff, batch_limit as i64], |r| r.get(0))?.collect()
    })?;

    if ids.is_empty() {
        return Ok(0);
    }

    storage.write_txn(|tx| {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM memory_jobs WHERE id IN ({placeholders})");
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        tx.execute(&sql, params.as_slice())?;
        Ok(())
    })?;

    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_tombstone(storage: &Storage, id: &str, deleted_at: &str) {
        storage
            .write(|conn| {
                conn.execute(
                    "INSERT INTO memories (id, content, normalized_content, content_hash, is_deleted, deleted_at, created_at, updated_at)
                     VALUES (?1,'c','c','h',1,?2,?2,?2)",
                    params![id, deleted_at],
                )
            })
            .unwrap();
    }

    #[test]
    fn sweep_purges_expired_tombstones_and_their_embeddings() {
        let storage = Arc::new(Storage::open(None).unwrap());
        insert_tombstone(&storage, "mem-old", "2000-01-01T00:00:00Z");
        storage
            .write(|conn| {
                conn.execute(
                    "INSERT INTO embeddings (id, source_type, source_id, dimensions, vector, created_at, updated_at)
                     VALUES ('e1','memory','mem-old',1,X'00000000','2000-01-01T00:00:00Z','2000-01-01T00:00:00Z')",
                    [],
                )
            })
            .unwrap();

        let report = sweep(&storage, &RetentionConfig::default()).unwrap();
        assert_eq!(report.memories_purged, 1);

        let remaining: i64 =
            storage.read(|conn| conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))).unwrap();
        assert_eq!(remaining, 0);
        let remaining_embeddings: i64 =
            storage.read(|conn| conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))).unwrap();
        assert_eq!(remaining_embeddings, 0);
    }

    #[test]
    fn sweep_leaves_fresh_tombstones_alone() {
        let storage = Arc::new(Storage::open(None).unwrap());
        insert_tombstone(&storage, "mem-new", &Utc::now().to_rfc3339());

        let report = sweep(&storage, &RetentionConfig::default()).unwrap();
        assert_eq!(report.memories_purged, 0);
    }
}
