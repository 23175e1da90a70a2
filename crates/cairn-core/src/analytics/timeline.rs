//! Chronological event timeline for a single memory id (spec.md §4.7).
//!
//! Job lifecycle events and history rows come straight out of storage.
//! "Log entries containing the id" (named in spec.md) has no persisted
//! log sink in this crate — only `tracing` output, which isn't captured
//! anywhere queryable — so that source is represented by the error ring
//! instead, which is the closest thing this crate keeps in memory.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::storage::Storage;

use super::errors::ErrorRing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    History,
    JobCreated,
    JobLeased,
    JobCompleted,
    JobFailed,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub at: DateTime<Utc>,
    pub kind: TimelineEventKind,
    pub detail: String,
}

/// Resolves an arbitrary id to the memory_id it refers to, per spec.md's
/// "direct, via history, or via job" resolution order.
pub fn resolve_memory_id(storage: &Storage, id: &str) -> Result<Option<String>> {
    storage.read(|conn| {
        let direct: Option<String> =
            conn.query_row("SELECT id FROM memories WHERE id = ?1", rusqlite::params![id], |r| r.get(0)).ok();
        if direct.is_some() {
            return Ok(direct);
        }
        let via_history: Option<String> = conn
            .query_row("SELECT memory_id FROM memory_history WHERE id = ?1", rusqlite::params![id], |r| r.get(0))
            .ok();
        if via_history.is_some() {
            return Ok(via_history);
        }
        let via_job: Option<String> =
            conn.query_row("SELECT memory_id FROM memory_jobs WHERE id = ?1", rusqlite::params![id], |r| r.get(0)).ok();
        Ok(via_job)
    })
}

pub fn build(storage: &Storage, errors: &ErrorRing, memory_id: &str) -> Result<Vec<TimelineEvent>> {
    let mut events = Vec::new();

    let history_rows: Vec<(String, String, Option<String>)> = storage.read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT created_at, event, reason FROM memory_history WHERE memory_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![memory_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    for (created_at, event, reason) in history_rows {
        if let Ok(at) = DateTime::parse_from_rfc3339(&created_at) {
            let detail = match reason {
                Some(r) => format!("{event}: {r}"),
                None => event,
            };
            events.push(TimelineEvent { at: at.with_timezone(&Utc), kind: TimelineEventKind::History, detail });
        }
    }

    #[allow(clippy::type_complexity)]
    let job_rows: Vec<(String, String, Option<String>, Option<String>, Option<String>)> = storage.read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT created_at, job_type, leased_at, completed_at, failed_at FROM memory_jobs WHERE memory_id = ?1",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![memory_id], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    for (created_at, job_type, leased_at, completed_at, failed_at) in job_rows {
        if let Ok(at) = DateTime::parse_from_rfc3339(&created_at) {
            events.push(TimelineEvent {
                at: at.with_timezone(&Utc),
                kind: TimelineEventKind::JobCreated,
                detail: format!("{job_type} job created"),
            });
        }
        if let Some(leased_at) = leased_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()) {
            events.push(TimelineEvent {
                at: leased_at.with_timezone(&Utc),
                kind: TimelineEventKind::JobLeased,
                detail: format!("{job_type} job leased"),
            });
        }
        if let Some(completed_at) = completed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()) {
            events.push(TimelineEvent {
                at: completed_at.with_timezone(&Utc),
                kind: TimelineEventKind::JobCompleted,
                detail: format!("{job_type} job completed"),
            });
        }
        if let Some(failed_at) = failed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()) {
            events.push(TimelineEvent {
                at: failed_at.with_timezone(&Utc),
                kind: TimelineEventKind::JobFailed,
                detail: format!("{job_type} job failed"),
            });
        }
    }

    for entry in errors.matching(|e| e.memory_id.as_deref() == Some(memory_id)) {
        events.push(TimelineEvent {
            at: entry.timestamp,
            kind: TimelineEventKind::Error,
            detail: format!("{}: {}", entry.code, entry.message),
        });
    }

    events.sort_by_key(|e| e.at);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::errors::{ErrorEntry, ErrorStage};
    use chrono::Duration;
    use rusqlite::params;

    fn seed_history(storage: &Storage, memory_id: &str) {
        storage
            .write(|conn| {
                conn.execute(
                    "INSERT INTO memory_history (id, memory_id, event, created_at) VALUES (?1, ?2, 'ADD', ?3)",
                    params!["hist-1", memory_id, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn resolve_memory_id_falls_back_to_history_lookup() {
        let storage = Storage::open(None).unwrap();
        seed_history(&storage, "mem-1");
        let resolved = resolve_memory_id(&storage, "hist-1").unwrap();
        assert_eq!(resolved.as_deref(), Some("mem-1"));
    }

    #[test]
    fn build_merges_history_and_error_ring_chronologically() {
        let storage = Storage::open(None).unwrap();
        seed_history(&storage, "mem-1");
        let ring = ErrorRing::new(10);
        ring.push(ErrorEntry {
            timestamp: Utc::now() + Duration::seconds(5),
            stage: ErrorStage::Mutation,
            code: "E1".to_string(),
            message: "oops".to_string(),
            request_id: None,
            memory_id: Some("mem-1".to_string()),
            actor: None,
        });

        let events = build(&storage, &ring, "mem-1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, TimelineEventKind::History);
        assert_eq!(events[1].kind, TimelineEventKind::Error);
    }
}
