//! The six concrete end-to-end scenarios named in spec.md §8, each
//! exercised against a fresh temp-file-backed store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use cairn_core::config::DaemonConfig;
use cairn_core::error::CoreError;
use cairn_core::jobs::sweep;
use cairn_core::memory::{ForgetSelector, HistoryEvent, MemoryPatch, BATCH_CONFIRM_THRESHOLD};
use cairn_core::recall::{RecallContext, RecallEngine, RecallQuery};
use cairn_core::session::{CheckpointSnapshot, CheckpointTrigger, CheckpointWriter};
use cairn_e2e_tests::harness::TestDb;
use cairn_e2e_tests::mocks::fixtures::{envelope, envelope_with_key, FakeEmbedder};

/// Same little-endian f32 layout as `cairn_core`'s private `pack_vector`,
/// which an external workspace member can't call directly.
fn pack_vector(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

#[tokio::test]
async fn dedup_by_idempotency() {
    let db = TestDb::open();
    let store = db.store();

    let first = store.ingest(envelope_with_key("User prefers dark mode", "k-1")).unwrap();
    let second = store.ingest(envelope_with_key("User prefers dark mode", "k-1")).unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.deduped);

    let count: i64 = db
        .storage
        .read(|conn| conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0)))
        .unwrap();
    assert_eq!(count, 1);

    let history = store.history(&first.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event, HistoryEvent::Add);
}

#[tokio::test]
async fn version_conflict_on_update() {
    let db = TestDb::open();
    let store = db.store();

    let seeded = store.ingest(envelope("The deploy key lives in the ops vault")).unwrap();
    let memory = store.get(&seeded.id).unwrap();
    assert_eq!(memory.version, 1);

    let err = store
        .update(&seeded.id, MemoryPatch::default(), "tighten wording", Some(2))
        .unwrap_err();
    assert!(matches!(err, CoreError::VersionConflict { current: 1 }));

    let history = store.history(&seeded.id).unwrap();
    assert_eq!(history.len(), 1, "rejected update must not append a history row");
}

#[tokio::test]
async fn batch_forget_confirm_token_flow() {
    let db = TestDb::open();
    let store = db.store();

    for i in 0..26 {
        store.ingest(envelope(&format!("fact number {i} about the build pipeline"))).unwrap();
    }

    let selector = ForgetSelector { limit: 100, ..Default::default() };
    let preview = store.batch_forget_preview(&selector).unwrap();
    assert_eq!(preview.count, 26);
    assert!(preview.requires_confirm);
    assert!(preview.count > BATCH_CONFIRM_THRESHOLD);
    let token = preview.confirm_token.clone().expect("26 items must mint a confirm token");

    let rejected = store.batch_forget_execute(&selector, None, "cleanup");
    assert!(matches!(rejected, Err(CoreError::BatchConfirmRequired { count: 26, .. })));

    let outcome = store.batch_forget_execute(&selector, Some(&token), "cleanup").unwrap();
    assert_eq!(outcome.total, 26);
    assert_eq!(outcome.updated, 26);

    let deleted: i64 = db
        .storage
        .read(|conn| conn.query_row("SELECT COUNT(*) FROM memories WHERE is_deleted = 1", [], |r| r.get(0)))
        .unwrap();
    assert_eq!(deleted, 26);

    // Matches the boundary case named alongside this scenario: 25 items
    // never requires a token.
    let db25 = TestDb::open();
    let store25 = db25.store();
    for i in 0..25 {
        store25.ingest(envelope(&format!("fact twenty-five {i}"))).unwrap();
    }
    let selector25 = ForgetSelector { limit: 100, ..Default::default() };
    let preview25 = store25.batch_forget_preview(&selector25).unwrap();
    assert_eq!(preview25.count, 25);
    assert!(!preview25.requires_confirm);
    store25.batch_forget_execute(&selector25, None, "cleanup").unwrap();
}

#[tokio::test]
async fn recall_fusion_respects_alpha() {
    let db = TestDb::open();
    let store = db.store();
    let embedder = Arc::new(FakeEmbedder::new(32));

    let lexical_only = store.ingest(envelope("the checkout flow retries payment webhooks")).unwrap();
    let semantic_only = store.ingest(envelope("unrelated notes about a vacation itinerary")).unwrap();

    // Give `semantic_only` an embedding identical to the query vector so
    // cosine similarity is maximal; leave it out of the FTS match by using
    // content with no shared tokens. `lexical_only` gets no embedding row,
    // so the vector path can never surface it.
    let query_text = "payment webhook retries";
    let query_vector = embedder.vector_for(query_text);
    db.storage
        .write(|conn| {
            conn.execute(
                "INSERT INTO embeddings (id, source_type, source_id, model, dimensions, vector, created_at, updated_at)
                 VALUES (?1,'memory',?2,'fake',32,?3,?4,?4)",
                rusqlite::params![
                    uuid::Uuid::new_v4().to_string(),
                    semantic_only.id,
                    pack_vector(&query_vector),
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
        })
        .unwrap();

    let engine = RecallEngine::new(db.storage.clone(), embedder.clone(), DaemonConfig::default().recall);

    let run = |alpha: f32| {
        let engine = &engine;
        let query_text = query_text.to_string();
        async move {
            engine
                .recall(
                    RecallQuery {
                        text: query_text,
                        limit: 10,
                        min_score: Some(0.0),
                        alpha: Some(alpha),
                        ..Default::default()
                    },
                    RecallContext::Decision,
                )
                .await
                .unwrap()
        }
    };

    let fused = run(0.5).await;
    let ids: Vec<&str> = fused.iter().map(|r| r.id.as_str()).collect();
    assert!(ids.contains(&lexical_only.id.as_str()));
    assert!(ids.contains(&semantic_only.id.as_str()));
    for window in fused.windows(2) {
        assert!(window[0].score >= window[1].score, "recall results must be sorted non-increasing by score");
    }

    let lexical_only_results = run(0.0).await;
    assert!(lexical_only_results.iter().any(|r| r.id == lexical_only.id));
    assert!(!lexical_only_results.iter().any(|r| r.id == semantic_only.id));

    let vector_only_results = run(1.0).await;
    assert!(vector_only_results.iter().any(|r| r.id == semantic_only.id));
    assert!(!vector_only_results.iter().any(|r| r.id == lexical_only.id));
}

#[tokio::test]
async fn retention_sweep_purges_expired_tombstone_but_keeps_history() {
    let db = TestDb::open();
    let store = db.store();

    let memory = store.ingest(envelope("a fact that will age out of its retention window")).unwrap();
    store.soft_delete(&memory.id, "superseded", false).unwrap();

    let entity_id = db
        .storage
        .write_txn(|tx| cairn_core::graph::upsert_entity(tx, "ops-vault", Some("system")))
        .unwrap();
    db.storage
        .write(|conn| {
            conn.execute(
                "INSERT INTO memory_entity_mentions (id, memory_id, entity_id, created_at) VALUES (?1,?2,?3,?4)",
                rusqlite::params![uuid::Uuid::new_v4().to_string(), memory.id, entity_id, chrono::Utc::now().to_rfc3339()],
            )
        })
        .unwrap();
    db.storage
        .write(|conn| {
            conn.execute(
                "INSERT INTO embeddings (id, source_type, source_id, model, dimensions, vector, created_at, updated_at)
                 VALUES (?1,'memory',?2,'fake',4,?3,?4,?4)",
                rusqlite::params![
                    uuid::Uuid::new_v4().to_string(),
                    memory.id,
                    pack_vector(&[0.1, 0.2, 0.3, 0.4]),
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
        })
        .unwrap();

    let stale = (chrono::Utc::now() - chrono::Duration::days(31)).to_rfc3339();
    db.storage
        .write(|conn| {
            conn.execute("UPDATE memories SET deleted_at = ?1 WHERE id = ?2", rusqlite::params![stale, memory.id])
        })
        .unwrap();

    let report = sweep(&db.storage, &db.config.retention).unwrap();
    assert_eq!(report.memories_purged, 1);

    let memory_count: i64 = db
        .storage
        .read(|conn| conn.query_row("SELECT COUNT(*) FROM memories WHERE id = ?1", rusqlite::params![memory.id], |r| r.get(0)))
        .unwrap();
    assert_eq!(memory_count, 0);

    let fts_count: i64 = db
        .storage
        .read(|conn| conn.query_row("SELECT COUNT(*) FROM memories_fts WHERE id = ?1", rusqlite::params![memory.id], |r| r.get(0)))
        .unwrap();
    assert_eq!(fts_count, 0);

    let embedding_count: i64 = db
        .storage
        .read(|conn| conn.query_row("SELECT COUNT(*) FROM embeddings WHERE source_id = ?1", rusqlite::params![memory.id], |r| r.get(0)))
        .unwrap();
    assert_eq!(embedding_count, 0);

    let mention_count: i64 = db
        .storage
        .read(|conn| conn.query_row("SELECT COUNT(*) FROM memory_entity_mentions WHERE memory_id = ?1", rusqlite::params![memory.id], |r| r.get(0)))
        .unwrap();
    assert_eq!(mention_count, 0);

    let history_count: i64 = db
        .storage
        .read(|conn| conn.query_row("SELECT COUNT(*) FROM memory_history WHERE memory_id = ?1", rusqlite::params![memory.id], |r| r.get(0)))
        .unwrap();
    assert_eq!(history_count, 2, "add + delete rows must survive the 180-day history window");
}

#[tokio::test]
async fn checkpoint_merge_and_flush() {
    let db = TestDb::open();
    let mut config = db.config.continuity.clone();
    config.flush_delay = StdDuration::from_millis(20);
    let writer = CheckpointWriter::new(db.storage.clone(), config);

    let first = CheckpointSnapshot {
        session_key: "s1".to_string(),
        harness: Some("claude-code".to_string()),
        project: Some("/repo".to_string()),
        project_normalized: Some("/repo".to_string()),
        prompt_count: 5,
        queries: vec!["first query".to_string()],
        remembers: vec![],
        digest: Some("first".to_string()),
    };
    let second = CheckpointSnapshot {
        session_key: "s1".to_string(),
        harness: Some("claude-code".to_string()),
        project: Some("/repo".to_string()),
        project_normalized: Some("/repo".to_string()),
        prompt_count: 3,
        queries: vec!["second query".to_string()],
        remembers: vec![],
        digest: Some("second".to_string()),
    };

    writer.queue_flush(first, CheckpointTrigger::Periodic);
    writer.queue_flush(second, CheckpointTrigger::Periodic);

    tokio::time::sleep(StdDuration::from_millis(80)).await;

    let count: i64 = db
        .storage
        .read(|conn| conn.query_row("SELECT COUNT(*) FROM session_checkpoints WHERE session_key = 's1'", [], |r| r.get(0)))
        .unwrap();
    assert_eq!(count, 1, "the debounced flush must merge both queued writes into a single row");

    let (digest, prompt_count, queries_json): (Option<String>, i64, String) = db
        .storage
        .read(|conn| {
            conn.query_row(
                "SELECT digest, prompt_count, memory_queries FROM session_checkpoints WHERE session_key = 's1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
        })
        .unwrap();
    assert_eq!(digest.as_deref(), Some("second"));
    assert_eq!(prompt_count, 8);

    let queries: Vec<String> = serde_json::from_str(&queries_json).unwrap();
    assert_eq!(queries, vec!["first query".to_string(), "second query".to_string()]);
}
