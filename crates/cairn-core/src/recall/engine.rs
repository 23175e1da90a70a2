//! `RecallEngine`: ties tokenization, the FTS5 lexical path, the linear-scan
//! vector path, and fusion together.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::config::RecallConfig;
use crate::error::Result;
use crate::memory::MemoryType;
use crate::providers::{EmbedConfig, Embedder};
use crate::storage::Storage;
use crate::util::{cosine, unpack_vector};

use super::fusion::{decay, fuse, normalize_bm25, RecallContext, ResultSource};
use super::tokenize::{fts_match_expr, tokenize};
use super::{RecallQuery, RecallResult};

pub struct RecallEngine {
    storage: Arc<Storage>,
    embedder: Arc<dyn Embedder>,
    config: RecallConfig,
}

impl RecallEngine {
    pub fn new(storage: Arc<Storage>, embedder: Arc<dyn Embedder>, config: RecallConfig) -> Self {
        Self { storage, embedder, config }
    }

    pub async fn recall(&self, query: RecallQuery, context: RecallContext) -> Result<Vec<RecallResult>> {
        let limit = if query.limit == 0 { self.config.top_k } else { query.limit };
        let alpha = query.alpha.unwrap_or(self.config.alpha);
        let min_score = query.min_score.unwrap_or(self.config.min_score);

        let tokens = tokenize(&query.text);
        let bm25 = if tokens.is_empty() {
            HashMap::new()
        } else {
            self.bm25_candidates(&tokens, limit * 2, query.memory_type, query.project.as_deref())?
        };

        // Vector path: resolve outside any transaction (suspension point),
        // per spec.md §5's no-suspension-inside-a-write-transaction rule —
        // this is a read path so there is no transaction to protect, but we
        // keep the same shape for consistency.
        let query_vector = self.embedder.embed(&query.text, &EmbedConfig::default()).await.ok().flatten();
        let vector = match &query_vector {
            Some(qv) => self.vector_candidates(qv, limit * 2, query.memory_type, query.project.as_deref())?,
            None => HashMap::new(),
        };

        let fused = fuse(&bm25, &vector, alpha);
        let ids: Vec<String> = fused.keys().cloned().collect();
        let rows = self.storage.read(|conn| load_rows(conn, &ids))?;

        let now = Utc::now();
        let mut results: Vec<RecallResult> = rows
            .into_iter()
            .filter_map(|row| {
                let (raw_score, source) = fused.get(&row.id).copied()?;
                if raw_score < min_score {
                    return None;
                }
                let score = if context == RecallContext::Hook {
                    let age_days = (now - row.created_at).num_seconds() as f64 / 86_400.0;
                    decay(row.pinned, row.importance, age_days)
                } else {
                    raw_score
                };
                Some((
                    RecallResult {
                        id: row.id,
                        content: row.content,
                        memory_type: row.memory_type,
                        importance: row.importance,
                        created_at: row.created_at,
                        score,
                        source,
                    },
                    row.created_at,
                ))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(r, _)| r)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit);

        if context == RecallContext::Hook {
            if let Some(session_key) = &query.session_key {
                self.record_session_candidates(session_key, &fused, &results)?;
            }
        }

        Ok(results)
    }

    /// Records every candidate considered for a hook-context recall into
    /// `session_memories` (spec.md §3, §4.5 step 7), so the summarizer's
    /// continuity-scoring pass can later rebuild the injected set. Rows are
    /// keyed on (session_key, memory_id); a repeat recall for the same
    /// session updates the ranking fields and accumulates `fts_hit_count`,
    /// leaving any `relevance_score` already written by continuity scoring
    /// untouched.
    fn record_session_candidates(
        &self,
        session_key: &str,
        fused: &HashMap<String, (f32, ResultSource)>,
        final_results: &[RecallResult],
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let ranked: HashMap<&str, (i64, f32)> =
            final_results.iter().enumerate().map(|(i, r)| (r.id.as_str(), (i as i64 + 1, r.score))).collect();

        self.storage.write_txn(|tx| {
            for (id, (effective_score, source)) in fused {
                let (rank, final_score, was_injected) = match ranked.get(id.as_str()) {
                    Some((rank, final_score)) => (Some(*rank), Some(*final_score), true),
                    None => (None, None, false),
                };
                let source_str = match source {
                    ResultSource::Bm25 => "fts_only",
                    ResultSource::Vector | ResultSource::Hybrid => "effective",
                };
                let fts_hit = matches!(source, ResultSource::Bm25 | ResultSource::Hybrid) as i64;
                tx.execute(
                    "INSERT INTO session_memories
                     (id, session_key, memory_id, source, effective_score, final_score, rank, was_injected, fts_hit_count, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                     ON CONFLICT(session_key, memory_id) DO UPDATE SET
                       source = excluded.source,
                       effective_score = excluded.effective_score,
                       final_score = excluded.final_score,
                       rank = excluded.rank,
                       was_injected = excluded.was_injected,
                       fts_hit_count = session_memories.fts_hit_count + excluded.fts_hit_count",
                    rusqlite::params![
                        uuid::Uuid::new_v4().to_string(),
                        session_key,
                        id,
                        source_str,
                        effective_score,
                        final_score,
                        rank,
                        was_injected as i64,
                        fts_hit,
                        now,
                    ],
                )?;
            }
            Ok(())
        })
    }

    fn bm25_candidates(
        &self,
        tokens: &[String],
        limit: usize,
        memory_type: Option<MemoryType>,
        project: Option<&str>,
    ) -> Result<HashMap<String, f32>> {
        let match_expr = fts_match_expr(tokens);
        self.storage.read(|conn| {
            let mut sql = String::from(
                "SELECT m.id, bm25(memories_fts) AS rank FROM memories_fts
                 JOIN memories m ON m.id = memories_fts.id
                 WHERE memories_fts MATCH ?1 AND m.is_deleted = 0",
            );
            if memory_type.is_some() {
                sql.push_str(" AND m.type = ?2");
            }
            if project.is_some() {
                sql.push_str(if memory_type.is_some() { " AND m.project = ?3" } else { " AND m.project = ?2" });
            }
            sql.push_str(" ORDER BY rank LIMIT ");
            sql.push_str(&limit.to_string());

            let mut stmt = conn.prepare(&sql)?;
            let mut scores = HashMap::new();
            let type_str = memory_type.map(|t| t.as_str().to_string());
            let rows: Vec<(String, f64)> = match (&type_str, project) {
                (Some(t), Some(p)) => stmt
                    .query_map(rusqlite::params![match_expr, t, p], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<_>>()?,
                (Some(t), None) => stmt
                    .query_map(rusqlite::params![match_expr, t], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<_>>()?,
                (None, Some(p)) => stmt
                    .query_map(rusqlite::params![match_expr, p], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<_>>()?,
                (None, None) => stmt
                    .query_map(rusqlite::params![match_expr], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<_>>()?,
            };
            for (id, raw) in rows {
                scores.insert(id, normalize_bm25(raw));
            }
            Ok(scores)
        })
    }

    fn vector_candidates(
        &self,
        query_vector: &[f32],
        limit: usize,
        memory_type: Option<MemoryType>,
        project: Option<&str>,
    ) -> Result<HashMap<String, f32>> {
        self.storage.read(|conn| {
            let mut sql = String::from(
                "SELECT m.id, e.vector FROM embeddings e
                 JOIN memories m ON m.id = e.source_id AND e.source_type = 'memory'
                 WHERE m.is_deleted = 0",
            );
            let type_str = memory_type.map(|t| t.as_str().to_string());
            if type_str.is_some() {
                sql.push_str(" AND m.type = ?1");
            }
            if project.is_some() {
                sql.push_str(if type_str.is_some() { " AND m.project = ?2" } else { " AND m.project = ?1" });
            }
            let mut stmt = conn.prepare(&sql)?;
            let rows: Vec<(String, Vec<u8>)> = match (&type_str, project) {
                (Some(t), Some(p)) => stmt
                    .query_map(rusqlite::params![t, p], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<_>>()?,
                (Some(t), None) => stmt
                    .query_map(rusqlite::params![t], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<_>>()?,
                (None, Some(p)) => stmt
                    .query_map(rusqlite::params![p], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<_>>()?,
                (None, None) => stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<_>>()?,
            };

            let mut scored: Vec<(String, f32)> = rows
                .into_iter()
                .map(|(id, bytes)| (id, cosine(query_vector, &unpack_vector(&bytes))))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit);
            Ok(scored.into_iter().collect())
        })
    }
}

struct CandidateRow {
    id: String,
    content: String,
    memory_type: MemoryType,
    importance: f32,
    pinned: bool,
    created_at: chrono::DateTime<Utc>,
}

fn load_rows(conn: &rusqlite::Connection, ids: &[String]) -> rusqlite::Result<Vec<CandidateRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT id, content, type, importance, pinned, created_at FROM memories WHERE id IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params = rusqlite::params_from_iter(ids.iter());
    stmt.query_map(params, |r| {
        let type_str: String = r.get(2)?;
        let created_at: String = r.get(5)?;
        Ok(CandidateRow {
            id: r.get(0)?,
            content: r.get(1)?,
            memory_type: MemoryType::parse_lenient(&type_str),
            importance: r.get(3)?,
            pinned: r.get::<_, i64>(4)? != 0,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    })?
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{IngestEnvelope, MemoryStore};
    use crate::providers::test_support::FakeEmbedder;

    fn envelope(content: &str) -> IngestEnvelope {
        IngestEnvelope {
            content: content.to_string(),
            importance: Some(0.8),
            confidence: None,
            memory_type: None,
            tags: vec![],
            idempotency_key: None,
            project: Some("demo".to_string()),
            session_id: None,
            who: None,
            source_type: None,
            runtime_path: None,
            pinned: false,
        }
    }

    #[tokio::test]
    async fn bm25_only_finds_lexical_match() {
        let storage = Arc::new(Storage::open(None).unwrap());
        let store = MemoryStore::new(storage.clone(), &crate::config::DaemonConfig::default());
        store.ingest(envelope("the database uses postgres for session storage")).unwrap();
        store.ingest(envelope("completely unrelated content about gardening")).unwrap();

        let engine = RecallEngine::new(storage, Arc::new(crate::providers::NullEmbedder), RecallConfig::default());
        let results = engine
            .recall(
                RecallQuery { text: "postgres session storage".to_string(), limit: 5, ..Default::default() },
                RecallContext::Decision,
            )
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert!(results[0].content.contains("postgres"));
    }

    #[tokio::test]
    async fn vector_path_used_when_embedder_present() {
        let storage = Arc::new(Storage::open(None).unwrap());
        let store = MemoryStore::new(storage.clone(), &crate::config::DaemonConfig::default());
        let ingested = store.ingest(envelope("a distinctive phrase about rust ownership")).unwrap();

        let embedder = Arc::new(FakeEmbedder::new(16));
        let vector = {
            use crate::providers::Embedder as _;
            futures_lite_embed(&*embedder, "a distinctive phrase about rust ownership").await
        };
        storage
            .write(|conn| {
                conn.execute(
                    "INSERT INTO embeddings (id, source_type, source_id, model, dimensions, vector, created_at, updated_at)
                     VALUES (?1,'memory',?2,'fake',16,?3,?4,?4)",
                    rusqlite::params![
                        uuid::Uuid::new_v4().to_string(),
                        ingested.id,
                        crate::util::pack_vector(&vector),
                        chrono::Utc::now().to_rfc3339(),
                    ],
                )
            })
            .unwrap();

        let engine = RecallEngine::new(storage, embedder, RecallConfig::default());
        let results = engine
            .recall(
                RecallQuery { text: "rust ownership".to_string(), limit: 5, ..Default::default() },
                RecallContext::Decision,
            )
            .await
            .unwrap();
        assert!(results.iter().any(|r| r.id == ingested.id));
    }

    async fn futures_lite_embed(embedder: &dyn crate::providers::Embedder, text: &str) -> Vec<f32> {
        embedder.embed(text, &EmbedConfig::default()).await.unwrap().unwrap()
    }
}
