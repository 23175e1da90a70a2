//! Debounced checkpoint flush, recovery lookup, and pruning (spec.md §4.4).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::config::ContinuityConfig;
use crate::error::Result;
use crate::storage::Storage;
use crate::util::redact;

use super::tracker::CheckpointSnapshot;

const MAX_MERGED_QUERIES: usize = 20;
const MAX_MERGED_REMEMBERS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTrigger {
    Periodic,
    PreCompaction,
    Agent,
    Explicit,
}

impl CheckpointTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            CheckpointTrigger::Periodic => "periodic",
            CheckpointTrigger::PreCompaction => "pre_compaction",
            CheckpointTrigger::Agent => "agent",
            CheckpointTrigger::Explicit => "explicit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointRow {
    pub session_key: String,
    pub harness: Option<String>,
    pub project: Option<String>,
    pub project_normalized: Option<String>,
    pub digest: Option<String>,
    pub created_at: DateTime<Utc>,
}

struct Pending {
    trigger: CheckpointTrigger,
    harness: Option<String>,
    project: Option<String>,
    project_normalized: Option<String>,
    digest: Option<String>,
    prompt_count: u32,
    queries: Vec<String>,
    remembers: Vec<String>,
    generation: u64,
}

/// Concatenates `incoming` onto `existing` and truncates to the last `cap`
/// entries. No de-duplication: spec.md §8's round-trip property for merged
/// checkpoints is plain concatenation-then-truncate, so a query or remember
/// repeated across two queued writes appears twice, same as the harness sent it.
fn merge_capped(existing: &mut Vec<String>, incoming: Vec<String>, cap: usize) {
    existing.extend(incoming);
    if existing.len() > cap {
        let drop = existing.len() - cap;
        existing.drain(0..drop);
    }
}

/// Queues checkpoint writes by session_key and flushes after `flush_delay`,
/// merging a second write arriving before flush completes.
pub struct CheckpointWriter {
    storage: Arc<Storage>,
    config: ContinuityConfig,
    pending: Mutex<HashMap<String, Pending>>,
}

impl CheckpointWriter {
    pub fn new(storage: Arc<Storage>, config: ContinuityConfig) -> Arc<Self> {
        Arc::new(Self { storage, config, pending: Mutex::new(HashMap::new()) })
    }

    /// Queues a checkpoint write, merging with any pending write for the
    /// same session, and schedules (or reschedules) the debounced flush.
    pub fn queue_flush(self: &Arc<Self>, snapshot: CheckpointSnapshot, trigger: CheckpointTrigger) {
        let session_key = snapshot.session_key.clone();
        let generation = {
            let mut pending = self.pending.lock().unwrap();
            let entry = pending.entry(session_key.clone()).or_insert_with(|| Pending {
                trigger,
                harness: snapshot.harness.clone(),
                project: snapshot.project.clone(),
                project_normalized: snapshot.project_normalized.clone(),
                digest: None,
                prompt_count: 0,
                queries: Vec::new(),
                remembers: Vec::new(),
                generation: 0,
            });
            entry.trigger = trigger;
            if snapshot.digest.is_some() {
                entry.digest = snapshot.digest;
            }
            entry.prompt_count += snapshot.prompt_count;
            merge_capped(&mut entry.queries, snapshot.queries, MAX_MERGED_QUERIES);
            merge_capped(&mut entry.remembers, snapshot.remembers, MAX_MERGED_REMEMBERS);
            entry.generation += 1;
            entry.generation
        };

        let this = Arc::clone(self);
        let delay = self.config.flush_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = this.flush_if_current(&session_key, generation) {
                tracing::error!(session_key, error = %e, "checkpoint flush failed");
            }
        });
    }

    fn flush_if_current(&self, session_key: &str, generation: u64) -> Result<()> {
        let pending = {
            let mut map = self.pending.lock().unwrap();
            match map.get(session_key) {
                Some(entry) if entry.generation == generation => map.remove(session_key),
                _ => None,
            }
        };
        let Some(pending) = pending else { return Ok(()) };

        let digest = pending.digest.as_deref().map(redact);
        let remembers = pending.remembers.iter().map(|r| redact(r)).collect::<Vec<_>>();
        let queries_json = serde_json::to_string(&pending.queries).unwrap_or_else(|_| "[]".to_string());
        let remembers_json = serde_json::to_string(&remembers).unwrap_or_else(|_| "[]".to_string());
        let now = Utc::now().to_rfc3339();
        let max_checkpoints = self.config.max_checkpoints_per_session;

        self.storage.write_txn(|tx| {
            tx.execute(
                "INSERT INTO session_checkpoints
                 (id, session_key, harness, project, project_normalized, trigger, digest, prompt_count, memory_queries, recent_remembers, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    session_key,
                    pending.harness,
                    pending.project,
                    pending.project_normalized,
                    pending.trigger.as_str(),
                    digest,
                    pending.prompt_count,
                    queries_json,
                    remembers_json,
                    now,
                ],
            )?;

            let excess: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM session_checkpoints WHERE session_key = ?1
                     ORDER BY created_at DESC LIMIT -1 OFFSET ?2",
                )?;
                stmt.query_map(params![session_key, max_checkpoints as i64], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?
            };
            for id in excess {
                tx.execute("DELETE FROM session_checkpoints WHERE id = ?1", params![id])?;
            }
            Ok(())
        })?;

        Ok(())
    }
}

/// Returns the newest checkpoint for `project_normalized` no older than
/// `within`, used to inject a "resuming from..." block at session start.
pub fn latest_checkpoint(storage: &Storage, project_normalized: &str, within: std::time::Duration) -> Result<Option<CheckpointRow>> {
    let cutoff = (Utc::now() - chrono::Duration::from_std(within).unwrap_or_default()).to_rfc3339();
    let row = storage.read(|conn| {
        conn.query_row(
            "SELECT session_key, harness, project, project_normalized, digest, created_at
             FROM session_checkpoints
             WHERE project_normalized = ?1 AND created_at >= ?2
             ORDER BY created_at DESC LIMIT 1",
            params![project_normalized, cutoff],
            |r| {
                let created_at: String = r.get(5)?;
                Ok(CheckpointRow {
                    session_key: r.get(0)?,
                    harness: r.get(1)?,
                    project: r.get(2)?,
                    project_normalized: r.get(3)?,
                    digest: r.get(4)?,
                    created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            },
        )
    });
    match row {
        Ok(row) => Ok(Some(row)),
        Err(crate::error::CoreError::Store(rusqlite::Error::QueryReturnedNoRows)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// A single strict delete of checkpoint rows older than `retention_days`.
pub fn prune(storage: &Storage, retention_days: u32) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days as i64)).to_rfc3339();
    let deleted = storage.write(|conn| conn.execute("DELETE FROM session_checkpoints WHERE created_at < ?1", params![cutoff]))?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(session_key: &str, digest: Option<&str>) -> CheckpointSnapshot {
        CheckpointSnapshot {
            session_key: session_key.to_string(),
            harness: Some("claude-code".to_string()),
            project: Some("/repo".to_string()),
            project_normalized: Some("/repo".to_string()),
            prompt_count: 1,
            queries: vec!["foo".to_string()],
            remembers: vec![],
            digest: digest.map(|d| d.to_string()),
        }
    }

    #[tokio::test]
    async fn flush_writes_one_row_and_merges_rapid_successive_writes() {
        let storage = Arc::new(Storage::open(None).unwrap());
        let mut config = ContinuityConfig::default();
        config.flush_delay = std::time::Duration::from_millis(20);
        let writer = CheckpointWriter::new(storage.clone(), config);

        writer.queue_flush(snapshot("s1", Some("first")), CheckpointTrigger::Periodic);
        writer.queue_flush(snapshot("s1", Some("second")), CheckpointTrigger::Periodic);

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;

        let count: i64 = storage
            .read(|conn| conn.query_row("SELECT COUNT(*) FROM session_checkpoints WHERE session_key = 's1'", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 1);

        let digest: Option<String> = storage
            .read(|conn| conn.query_row("SELECT digest FROM session_checkpoints WHERE session_key = 's1'", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(digest.as_deref(), Some("second"));
    }

    #[test]
    fn latest_checkpoint_respects_recency_window() {
        let storage = Storage::open(None).unwrap();
        storage
            .write(|conn| {
                conn.execute(
                    "INSERT INTO session_checkpoints (id, session_key, project_normalized, trigger, prompt_count, created_at)
                     VALUES ('c1','s1','/repo','periodic',1,?1)",
                    params![Utc::now().to_rfc3339()],
                )
            })
            .unwrap();

        let found = latest_checkpoint(&storage, "/repo", std::time::Duration::from_secs(3600)).unwrap();
        assert!(found.is_some());

        let none = latest_checkpoint(&storage, "/other", std::time::Duration::from_secs(3600)).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn prune_removes_rows_older_than_retention() {
        let storage = Storage::open(None).unwrap();
        storage
            .write(|conn| {
                conn.execute(
                    "INSERT INTO session_checkpoints (id, session_key, trigger, prompt_count, created_at)
                     VALUES ('c1','s1','periodic',1,'2000-01-01T00:00:00Z')",
                    [],
                )
            })
            .unwrap();
        let deleted = prune(&storage, 7).unwrap();
        assert_eq!(deleted, 1);
    }
}
