//! `MemoryStore` operations: ingest/update/soft_delete/recover/batch_forget,
//! each wrapped in an IMMEDIATE write transaction per spec.md §4.1/§5.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use rusqlite::{OptionalExtension, Row, Transaction, params};

use crate::config::DaemonConfig;
use crate::error::{CoreError, Result};
use crate::storage::Storage;
use crate::util::{collapse_whitespace, confirm_token, content_hash, normalize_content, time_bucket, verify_confirm_token};

use super::types::{
    BATCH_CONFIRM_THRESHOLD, BATCH_FORGET_MAX_LIMIT, ForgetOutcome, ForgetPreview, ForgetSelector,
    HistoryEvent, IngestEnvelope, IngestResult, Memory, MemoryHistoryRow, MemoryPatch, MemoryType,
    PatchResult, UpdateResult,
};

/// Implemented by the job queue so `MemoryStore` can schedule pipeline work
/// without depending on the `jobs` module — mirrors the `LlmProvider`/
/// `Embedder` capability-contract pattern in `providers.rs`.
pub trait JobScheduler: Send + Sync {
    fn schedule_extract_embed(&self, memory_id: &str) -> Result<()>;
}

/// No-op scheduler, used when a caller only needs CRUD semantics (tests, or
/// a daemon mode with pipeline workers disabled).
pub struct NullScheduler;

impl JobScheduler for NullScheduler {
    fn schedule_extract_embed(&self, _memory_id: &str) -> Result<()> {
        Ok(())
    }
}

pub struct MemoryStore {
    storage: Arc<Storage>,
    scheduler: Arc<dyn JobScheduler>,
    dedup_window_days: i64,
    tombstone_retention: Duration,
    confirm_secret: [u8; 32],
}

impl MemoryStore {
    pub fn new(storage: Arc<Storage>, config: &DaemonConfig) -> Self {
        Self::with_scheduler(storage, config, Arc::new(NullScheduler))
    }

    pub fn with_scheduler(
        storage: Arc<Storage>,
        config: &DaemonConfig,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self {
            storage,
            scheduler,
            dedup_window_days: config.dedup_window_days,
            tombstone_retention: config.retention.tombstone,
            confirm_secret: secret,
        }
    }

    pub fn get(&self, id: &str) -> Result<Memory> {
        self.storage
            .read(|conn| {
                conn.query_row(
                    "SELECT * FROM memories WHERE id = ?1 AND is_deleted = 0",
                    params![id],
                    row_to_memory,
                )
                .optional()
            })?
            .ok_or(CoreError::NotFound)
    }

    /// Full audit trail for a memory, oldest first (spec.md §4.1/§6).
    /// Doesn't require the memory to still exist — a fully-purged tombstone
    /// still has a readable history until its own retention window elapses.
    pub fn history(&self, id: &str) -> Result<Vec<MemoryHistoryRow>> {
        self.storage.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, memory_id, event, old_content, new_content, changed_by, reason, metadata, created_at
                 FROM memory_history WHERE memory_id = ?1 ORDER BY created_at ASC",
            )?;
            stmt.query_map(params![id], row_to_history_row)?.collect()
        })
    }

    /// Insert-or-dedup (spec.md §4.1).
    pub fn ingest(&self, envelope: IngestEnvelope) -> Result<IngestResult> {
        let now = Utc::now();
        let content = collapse_whitespace(envelope.content.trim());
        let normalized = normalize_content(&content);
        let hash = content_hash(&normalized);

        let result = self.storage.write_txn(|tx| {
            if let Some(key) = &envelope.idempotency_key {
                if let Some(existing_id) = find_by_idempotency_key(tx, key)? {
                    return Ok(IngestResult { id: existing_id, deduped: true });
                }
            }

            if let Some(existing_id) =
                find_dedup_candidate(tx, &hash, envelope.project.as_deref(), envelope.who.as_deref(), self.dedup_window_days, now)?
            {
                tx.execute(
                    "UPDATE memories SET updated_at = ?1 WHERE id = ?2",
                    params![now.to_rfc3339(), existing_id],
                )?;
                return Ok(IngestResult { id: existing_id, deduped: true });
            }

            let id = uuid::Uuid::new_v4().to_string();
            let memory_type = envelope.memory_type.unwrap_or_default();
            let tags_json = serde_json::to_string(&envelope.tags).unwrap_or_else(|_| "[]".to_string());
            let importance = envelope.importance.unwrap_or(0.5).clamp(0.0, 1.0);
            let confidence = envelope.confidence.unwrap_or(0.5).clamp(0.0, 1.0);

            tx.execute(
                "INSERT INTO memories (
                    id, content, normalized_content, content_hash, type, importance, confidence,
                    pinned, project, session_id, who, source_type, tags, runtime_path, version,
                    is_deleted, idempotency_key, created_at, updated_at, extraction_status
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,1,0,?15,?16,?16,'pending')",
                params![
                    id,
                    content,
                    normalized,
                    hash,
                    memory_type.as_str(),
                    importance,
                    confidence,
                    envelope.pinned,
                    envelope.project,
                    envelope.session_id,
                    envelope.who,
                    envelope.source_type,
                    tags_json,
                    envelope.runtime_path,
                    envelope.idempotency_key,
                    now.to_rfc3339(),
                ],
            )?;

            write_history(tx, &id, HistoryEvent::Add, None, Some(&content), envelope.who.as_deref(), None, now)?;

            Ok(IngestResult { id, deduped: false })
        })?;

        if !result.deduped {
            self.scheduler.schedule_extract_embed(&result.id)?;
        }
        Ok(result)
    }

    /// Applies a partial patch, enforcing reason/version preconditions
    /// (spec.md §4.1).
    pub fn update(
        &self,
        id: &str,
        patch: MemoryPatch,
        reason: &str,
        if_version: Option<i64>,
    ) -> Result<UpdateResult> {
        if reason.trim().is_empty() {
            return Err(CoreError::MissingReason);
        }

        let now = Utc::now();
        let (result, content_changed) = self.storage.write_txn(|tx| {
            let (current_version, old_content, is_deleted): (i64, String, bool) = tx
                .query_row(
                    "SELECT version, content, is_deleted FROM memories WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get::<_, i64>(2)? != 0)),
                )
                .optional()?
                .ok_or(CoreError::NotFound)?;

            if is_deleted {
                return Err(CoreError::NotFound);
            }

            if let Some(expected) = if_version {
                if expected != current_version {
                    return Err(CoreError::VersionConflict { current: current_version });
                }
            }

            let new_version = current_version + 1;
            let content_changed = patch.content.is_some();
            let new_content = patch
                .content
                .as_deref()
                .map(|c| collapse_whitespace(c.trim()))
                .unwrap_or_else(|| old_content.clone());

            if content_changed {
                let normalized = normalize_content(&new_content);
                let hash = content_hash(&normalized);
                tx.execute(
                    "UPDATE memories SET content = ?1, normalized_content = ?2, content_hash = ?3,
                     version = ?4, updated_at = ?5 WHERE id = ?6",
                    params![new_content, normalized, hash, new_version, now.to_rfc3339(), id],
                )?;
            } else {
                tx.execute(
                    "UPDATE memories SET version = ?1, updated_at = ?2 WHERE id = ?3",
                    params![new_version, now.to_rfc3339(), id],
                )?;
            }

            if let Some(memory_type) = patch.memory_type {
                tx.execute("UPDATE memories SET type = ?1 WHERE id = ?2", params![memory_type.as_str(), id])?;
            }
            if let Some(importance) = patch.importance {
                tx.execute(
                    "UPDATE memories SET importance = ?1 WHERE id = ?2",
                    params![importance.clamp(0.0, 1.0), id],
                )?;
            }
            if let Some(tags) = &patch.tags {
                let tags_json = serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string());
                tx.execute("UPDATE memories SET tags = ?1 WHERE id = ?2", params![tags_json, id])?;
            }

            write_history(
                tx,
                id,
                HistoryEvent::Update,
                content_changed.then_some(old_content.as_str()),
                content_changed.then_some(new_content.as_str()),
                None,
                Some(reason),
                now,
            )?;

            Ok((UpdateResult { status: "updated", version: new_version }, content_changed))
        })?;

        if content_changed {
            self.scheduler.schedule_extract_embed(id)?;
        }
        Ok(result)
    }

    /// Tombstones a memory (spec.md §4.1).
    pub fn soft_delete(&self, id: &str, reason: &str, force: bool) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(CoreError::MissingReason);
        }
        let now = Utc::now();
        self.storage.write_txn(|tx| {
            let (content, pinned, is_deleted): (String, bool, bool) = tx
                .query_row(
                    "SELECT content, pinned, is_deleted FROM memories WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get(0)?, r.get::<_, i64>(1)? != 0, r.get::<_, i64>(2)? != 0)),
                )
                .optional()?
                .ok_or(CoreError::NotFound)?;

            if is_deleted {
                return Err(CoreError::NotFound);
            }
            if pinned && !force {
                return Err(CoreError::PinnedRequiresForce);
            }

            tx.execute(
                "UPDATE memories SET is_deleted = 1, deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), id],
            )?;
            write_history(tx, id, HistoryEvent::Delete, Some(&content), None, None, Some(reason), now)?;
            Ok(())
        })
    }

    /// Un-tombstones a memory while it remains within the retention window
    /// (spec.md §4.1).
    pub fn recover(&self, id: &str, reason: &str) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(CoreError::MissingReason);
        }
        let now = Utc::now();
        self.storage.write_txn(|tx| {
            let deleted_at: Option<String> = tx
                .query_row(
                    "SELECT deleted_at FROM memories WHERE id = ?1 AND is_deleted = 1",
                    params![id],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or(CoreError::NotFound)?;

            let deleted_at = deleted_at.ok_or_else(|| CoreError::Corruption("tombstone missing deleted_at".into()))?;
            let deleted_at = chrono::DateTime::parse_from_rfc3339(&deleted_at)
                .map_err(|e| CoreError::Corruption(format!("unparseable deleted_at: {e}")))?
                .with_timezone(&Utc);

            if now.signed_duration_since(deleted_at).to_std().unwrap_or(Duration::MAX) > self.tombstone_retention {
                return Err(CoreError::RetentionExpired);
            }

            tx.execute(
                "UPDATE memories SET is_deleted = 0, deleted_at = NULL, updated_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), id],
            )?;
            write_history(tx, id, HistoryEvent::Recover, None, None, None, Some(reason), now)?;
            Ok(())
        })
    }

    /// Previews a batch forget selector, minting a confirm token when the
    /// matched count exceeds the threshold (spec.md §4.1).
    pub fn batch_forget_preview(&self, selector: &ForgetSelector) -> Result<ForgetPreview> {
        let limit = selector.limit.min(BATCH_FORGET_MAX_LIMIT);
        let now = Utc::now();
        let (digest, ids) = self.storage.read(|conn| select_forget_candidates(conn, selector, limit))?;

        let count = ids.len();
        let requires_confirm = count > BATCH_CONFIRM_THRESHOLD;
        let token = requires_confirm
            .then(|| confirm_token(&self.confirm_secret, &digest, count, time_bucket(now)));

        Ok(ForgetPreview { count, matched_ids: ids, requires_confirm, confirm_token: token })
    }

    /// Executes a batch forget (spec.md §4.1). `if_version` is rejected by
    /// construction: `ForgetSelector` carries no version field.
    pub fn batch_forget_execute(
        &self,
        selector: &ForgetSelector,
        confirm_token_value: Option<&str>,
        reason: &str,
    ) -> Result<ForgetOutcome> {
        if reason.trim().is_empty() {
            return Err(CoreError::MissingReason);
        }
        let limit = selector.limit.min(BATCH_FORGET_MAX_LIMIT);
        let now = Utc::now();

        let (digest, ids) = self.storage.read(|conn| select_forget_candidates(conn, selector, limit))?;
        let count = ids.len();

        if count > BATCH_CONFIRM_THRESHOLD {
            let token = confirm_token_value.ok_or(CoreError::BatchConfirmRequired {
                count,
                confirm_token: confirm_token(&self.confirm_secret, &digest, count, time_bucket(now)),
            })?;
            if !verify_confirm_token(&self.confirm_secret, &digest, count, now, token) {
                return Err(CoreError::BatchConfirmInvalid);
            }
        }

        let mut results = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.soft_delete(id, reason, false) {
                Ok(()) => results.push(PatchResult { id: id.clone(), status: "deleted".to_string() }),
                Err(CoreError::PinnedRequiresForce) => {
                    results.push(PatchResult { id: id.clone(), status: "skipped_pinned".to_string() })
                }
                Err(CoreError::NotFound) => {
                    results.push(PatchResult { id: id.clone(), status: "not_found".to_string() })
                }
                Err(other) => return Err(other),
            }
        }

        let updated = results.iter().filter(|r| r.status == "deleted").count();
        Ok(ForgetOutcome { total: ids.len(), updated, results })
    }
}

fn find_by_idempotency_key(tx: &Transaction, key: &str) -> rusqlite::Result<Option<String>> {
    tx.query_row("SELECT id FROM memories WHERE idempotency_key = ?1", params![key], |r| r.get(0)).optional()
}

fn find_dedup_candidate(
    tx: &Transaction,
    hash: &str,
    project: Option<&str>,
    who: Option<&str>,
    window_days: i64,
    now: chrono::DateTime<Utc>,
) -> rusqlite::Result<Option<String>> {
    let cutoff = (now - chrono::Duration::days(window_days)).to_rfc3339();
    tx.query_row(
        "SELECT id FROM memories
         WHERE content_hash = ?1 AND is_deleted = 0
           AND (project IS ?2) AND (who IS ?3)
           AND created_at >= ?4
         ORDER BY created_at DESC LIMIT 1",
        params![hash, project, who, cutoff],
        |r| r.get(0),
    )
    .optional()
}

#[allow(clippy::too_many_arguments)]
fn write_history(
    tx: &Transaction,
    memory_id: &str,
    event: HistoryEvent,
    old_content: Option<&str>,
    new_content: Option<&str>,
    changed_by: Option<&str>,
    reason: Option<&str>,
    now: chrono::DateTime<Utc>,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO memory_history (id, memory_id, event, old_content, new_content, changed_by, reason, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            uuid::Uuid::new_v4().to_string(),
            memory_id,
            event.as_str(),
            old_content,
            new_content,
            changed_by,
            reason,
            now.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Builds the WHERE clause for a forget selector and returns a stable
/// digest of it (for the confirm token) plus the matched ids, bounded by
/// `limit`.
fn select_forget_candidates(
    conn: &rusqlite::Connection,
    selector: &ForgetSelector,
    limit: usize,
) -> rusqlite::Result<(String, Vec<String>)> {
    let mut clauses = vec!["is_deleted = 0".to_string()];
    let mut digest_parts = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ids) = &selector.ids {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        clauses.push(format!("id IN ({placeholders})"));
        for id in ids {
            params.push(Box::new(id.clone()));
        }
        digest_parts.push(format!("ids={}", ids.join(",")));
    }
    if let Some(t) = selector.memory_type {
        clauses.push("type = ?".to_string());
        params.push(Box::new(t.as_str().to_string()));
        digest_parts.push(format!("type={}", t.as_str()));
    }
    if let Some(project) = &selector.project {
        clauses.push("project = ?".to_string());
        params.push(Box::new(project.clone()));
        digest_parts.push(format!("project={project}"));
    }
    if let Some(older_than) = selector.older_than {
        clauses.push("created_at < ?".to_string());
        params.push(Box::new(older_than.to_rfc3339()));
        digest_parts.push(format!("olderThan={}", older_than.to_rfc3339()));
    }
    digest_parts.push(format!("limit={limit}"));

    let sql = format!(
        "SELECT id FROM memories WHERE {} ORDER BY created_at ASC LIMIT {}",
        clauses.join(" AND "),
        limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let ids = stmt
        .query_map(param_refs.as_slice(), |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok((digest_parts.join("|"), ids))
}

fn row_to_history_row(row: &Row) -> rusqlite::Result<MemoryHistoryRow> {
    let event_str: String = row.get("event")?;
    let created_at: String = row.get("created_at")?;
    let metadata: Option<String> = row.get("metadata")?;

    Ok(MemoryHistoryRow {
        id: row.get("id")?,
        memory_id: row.get("memory_id")?,
        event: HistoryEvent::from_str(&event_str).unwrap_or(HistoryEvent::Update),
        old_content: row.get("old_content")?,
        new_content: row.get("new_content")?,
        changed_by: row.get("changed_by")?,
        reason: row.get("reason")?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let tags_json: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let type_str: String = row.get("type")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let deleted_at: Option<String> = row.get("deleted_at")?;

    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        normalized_content: row.get("normalized_content")?,
        content_hash: row.get("content_hash")?,
        memory_type: MemoryType::parse_lenient(&type_str),
        importance: row.get("importance")?,
        confidence: row.get("confidence")?,
        pinned: row.get::<_, i64>("pinned")? != 0,
        project: row.get("project")?,
        session_id: row.get("session_id")?,
        who: row.get("who")?,
        source_type: row.get("source_type")?,
        tags,
        runtime_path: row.get("runtime_path")?,
        version: row.get("version")?,
        is_deleted: row.get::<_, i64>("is_deleted")? != 0,
        deleted_at: deleted_at.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        idempotency_key: row.get("idempotency_key")?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_by: row.get("updated_by")?,
        embedding_model: row.get("embedding_model")?,
        extraction_status: row.get("extraction_status")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> MemoryStore {
        let storage = Arc::new(Storage::open(None).unwrap());
        MemoryStore::new(storage, &DaemonConfig::default())
    }

    fn envelope(content: &str) -> IngestEnvelope {
        IngestEnvelope {
            content: content.to_string(),
            importance: None,
            confidence: None,
            memory_type: None,
            tags: vec![],
            idempotency_key: None,
            project: Some("demo".to_string()),
            session_id: None,
            who: Some("agent".to_string()),
            source_type: None,
            runtime_path: None,
            pinned: false,
        }
    }

    #[test]
    fn ingest_then_get_round_trips() {
        let store = test_store();
        let result = store.ingest(envelope("Use Postgres for the sessions table.")).unwrap();
        assert!(!result.deduped);
        let memory = store.get(&result.id).unwrap();
        assert_eq!(memory.content, "Use Postgres for the sessions table.");
        assert_eq!(memory.version, 1);
    }

    #[test]
    fn ingest_dedupes_by_content_hash_within_window() {
        let store = test_store();
        let first = store.ingest(envelope("Prefer tabs over spaces.")).unwrap();
        let second = store.ingest(envelope("Prefer tabs over spaces.")).unwrap();
        assert!(second.deduped);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn ingest_dedupes_by_idempotency_key() {
        let store = test_store();
        let mut env = envelope("first phrasing");
        env.idempotency_key = Some("key-1".to_string());
        let first = store.ingest(env).unwrap();

        let mut env2 = envelope("different phrasing entirely");
        env2.idempotency_key = Some("key-1".to_string());
        let second = store.ingest(env2).unwrap();

        assert!(second.deduped);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn update_requires_reason() {
        let store = test_store();
        let result = store.ingest(envelope("some fact")).unwrap();
        let err = store.update(&result.id, MemoryPatch::default(), "", None).unwrap_err();
        assert!(matches!(err, CoreError::MissingReason));
    }

    #[test]
    fn update_rejects_stale_version() {
        let store = test_store();
        let result = store.ingest(envelope("some fact")).unwrap();
        let err = store
            .update(&result.id, MemoryPatch::default(), "fix typo", Some(99))
            .unwrap_err();
        assert!(matches!(err, CoreError::VersionConflict { current: 1 }));
    }

    #[test]
    fn update_bumps_version_and_history() {
        let store = test_store();
        let result = store.ingest(envelope("original content")).unwrap();
        let patch = MemoryPatch { content: Some("revised content".to_string()), ..Default::default() };
        let updated = store.update(&result.id, patch, "correcting typo", Some(1)).unwrap();
        assert_eq!(updated.version, 2);
        let memory = store.get(&result.id).unwrap();
        assert_eq!(memory.content, "revised content");
    }

    #[test]
    fn soft_delete_pinned_requires_force() {
        let store = test_store();
        let mut env = envelope("important rule");
        env.pinned = true;
        let result = store.ingest(env).unwrap();
        let err = store.soft_delete(&result.id, "cleanup", false).unwrap_err();
        assert!(matches!(err, CoreError::PinnedRequiresForce));
        store.soft_delete(&result.id, "cleanup", true).unwrap();
        assert!(matches!(store.get(&result.id).unwrap_err(), CoreError::NotFound));
    }

    #[test]
    fn recover_restores_within_window() {
        let store = test_store();
        let result = store.ingest(envelope("temp note")).unwrap();
        store.soft_delete(&result.id, "no longer needed", false).unwrap();
        store.recover(&result.id, "changed my mind").unwrap();
        let memory = store.get(&result.id).unwrap();
        assert!(!memory.is_deleted);
    }

    #[test]
    fn batch_forget_preview_requires_confirm_above_threshold() {
        let store = test_store();
        for i in 0..30 {
            store.ingest(envelope(&format!("note number {i}"))).unwrap();
        }
        let selector = ForgetSelector { project: Some("demo".to_string()), limit: 500, ..Default::default() };
        let preview = store.batch_forget_preview(&selector).unwrap();
        assert_eq!(preview.count, 30);
        assert!(preview.requires_confirm);
        assert!(preview.confirm_token.is_some());

        let err = store.batch_forget_execute(&selector, None, "cleanup").unwrap_err();
        assert!(matches!(err, CoreError::BatchConfirmRequired { count: 30, .. }));

        let outcome = store
            .batch_forget_execute(&selector, preview.confirm_token.as_deref(), "cleanup")
            .unwrap();
        assert_eq!(outcome.updated, 30);
    }

    #[test]
    fn batch_forget_under_threshold_needs_no_confirm() {
        let store = test_store();
        for i in 0..5 {
            store.ingest(envelope(&format!("entry {i}"))).unwrap();
        }
        let selector = ForgetSelector { project: Some("demo".to_string()), limit: 500, ..Default::default() };
        let outcome = store.batch_forget_execute(&selector, None, "cleanup").unwrap();
        assert_eq!(outcome.updated, 5);
    }
}
