//! Data model for the memory store: the `Memory` record, its history rows,
//! and the request/patch/selector shapes at the store's boundary.
//!
//! Boundary-facing types use `deny_unknown_fields` to reject field
//! injection, following the same convention the teacher applies to its
//! ingest/recall inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Fact,
    Preference,
    Decision,
    Procedural,
    Semantic,
    Issue,
    Rule,
    Learning,
    General,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Decision => "decision",
            MemoryType::Procedural => "procedural",
            MemoryType::Semantic => "semantic",
            MemoryType::Issue => "issue",
            MemoryType::Rule => "rule",
            MemoryType::Learning => "learning",
            MemoryType::General => "general",
        }
    }

    /// Parses a type name, defaulting to `Fact` for anything unrecognized —
    /// the extract pipeline stage relies on this leniency (spec.md §4.2:
    /// "type defaults to fact on unknown").
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "preference" => MemoryType::Preference,
            "decision" => MemoryType::Decision,
            "procedural" => MemoryType::Procedural,
            "semantic" => MemoryType::Semantic,
            "issue" => MemoryType::Issue,
            "rule" => MemoryType::Rule,
            "learning" => MemoryType::Learning,
            "general" => MemoryType::General,
            _ => MemoryType::Fact,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The central mutable record (spec.md §3 Memory).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub normalized_content: String,
    pub content_hash: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub importance: f32,
    pub confidence: f32,
    pub pinned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub who: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_path: Option<String>,
    pub version: i64,
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    pub extraction_status: String,
}

/// Input to `MemoryStore::ingest` (spec.md §4.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngestEnvelope {
    pub content: String,
    #[serde(default)]
    pub importance: Option<f32>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(rename = "type", default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub who: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub runtime_path: Option<String>,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub id: String,
    pub deduped: bool,
}

/// Partial patch accepted by `MemoryStore::update` (spec.md §4.1: "apply a
/// partial patch {content?, type?, importance?, tags?}").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemoryPatch {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "type", default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub importance: Option<f32>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    pub status: &'static str,
    pub version: i64,
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryEvent {
    Add,
    Update,
    Delete,
    Recover,
}

impl HistoryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryEvent::Add => "ADD",
            HistoryEvent::Update => "UPDATE",
            HistoryEvent::Delete => "DELETE",
            HistoryEvent::Recover => "RECOVER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ADD" => Some(HistoryEvent::Add),
            "UPDATE" => Some(HistoryEvent::Update),
            "DELETE" => Some(HistoryEvent::Delete),
            "RECOVER" => Some(HistoryEvent::Recover),
            _ => None,
        }
    }
}

/// Append-only audit row (spec.md §3 Memory History).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHistoryRow {
    pub id: String,
    pub memory_id: String,
    pub event: HistoryEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Selector for `MemoryStore::batch_forget` (spec.md §4.1).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForgetSelector {
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(rename = "type", default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub older_than: Option<DateTime<Utc>>,
    #[serde(default = "default_forget_limit")]
    pub limit: usize,
}

fn default_forget_limit() -> usize {
    500
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgetMode {
    Preview,
    Execute,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgetPreview {
    pub count: usize,
    pub matched_ids: Vec<String>,
    pub requires_confirm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgetOutcome {
    pub total: usize,
    pub updated: usize,
    pub results: Vec<PatchResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResult {
    pub id: String,
    pub status: String,
}

/// Threshold above which a batch forget requires a confirm token
/// (spec.md §8 boundary behavior: 25 does not require confirm, 26 does).
pub const BATCH_CONFIRM_THRESHOLD: usize = 25;
pub const BATCH_FORGET_MAX_LIMIT: usize = 500;
