//! Hybrid recall: BM25 (FTS5) lexical search fused with a linear-scan
//! cosine vector search, per spec.md §4.3. No ANN index — the corpus size
//! this daemon targets makes a linear scan acceptable.

mod engine;
mod fusion;
mod tokenize;

pub use engine::RecallEngine;
pub use fusion::{RecallContext, ResultSource};
pub use tokenize::tokenize;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::MemoryType;

#[derive(Debug, Clone, Default)]
pub struct RecallQuery {
    pub text: String,
    pub limit: usize,
    pub memory_type: Option<MemoryType>,
    pub project: Option<String>,
    /// `None` defers to `RecallConfig::min_score`. A plain `f32` can't
    /// distinguish "unset" from an explicit 0.0, which matters since 0.0
    /// is itself a meaningful threshold.
    pub min_score: Option<f32>,
    /// `None` defers to `RecallConfig::alpha`. Same reasoning as
    /// `min_score`: 0.0 and 1.0 are both meaningful alpha values (spec.md
    /// §8's fusion round-trip: alpha=0 is BM25-only, alpha=1 is
    /// vector-only), so they can't double as an "unset" sentinel.
    pub alpha: Option<f32>,
    /// When set and `context` is `Hook`, every candidate considered is
    /// recorded into `session_memories` (spec.md §3, §4.5 step 7) so the
    /// summarizer's later continuity-scoring pass can rebuild the set of
    /// memories actually injected into this session.
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallResult {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    pub score: f32,
    pub source: ResultSource,
}
