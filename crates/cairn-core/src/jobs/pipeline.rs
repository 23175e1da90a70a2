//! Pipeline stage implementations: extract, decide, embed (spec.md §4.2).
//! `summarize` lives in `crate::session::summarize` since it operates on
//! `summary_jobs`, not `memory_jobs`.

use std::sync::Arc;

use rusqlite::params;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::JobsConfig;
use crate::error::{CoreError, ProviderError, Result};
use crate::graph::{link_mention, upsert_entity, upsert_relation};
use crate::providers::{EmbedConfig, Embedder, LlmProvider};
use crate::recall::{RecallContext, RecallEngine, RecallQuery};
use crate::storage::Storage;
use crate::util::pack_vector;

use super::types::LeasedJob;

const MAX_FACTS: usize = 20;
const MAX_ENTITIES: usize = 50;
const FACT_MIN_LEN: usize = 20;
const FACT_MAX_LEN: usize = 2000;
const DECIDE_CANDIDATES: usize = 5;

pub struct PipelineContext {
    pub storage: Arc<Storage>,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub recall: Arc<RecallEngine>,
    pub jobs: JobsConfig,
}

#[derive(Debug, Deserialize)]
struct RawExtractOutput {
    #[serde(default)]
    facts: Vec<Value>,
    #[serde(default)]
    entities: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawDecideOutput {
    #[serde(default)]
    action: String,
    #[serde(default, rename = "targetId")]
    target_id: Option<String>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reason: String,
}

/// Runs the `extract` stage: asks the LLM for candidate facts and entity
/// relations from a memory's content, validates the output leniently, and
/// persists the entity graph. Never fails the job on malformed LLM output —
/// only a provider/timeout error propagates.
pub async fn run_extract(ctx: &PipelineContext, job: &LeasedJob) -> Result<Value> {
    let content: String = ctx
        .storage
        .read(|conn| conn.query_row("SELECT content FROM memories WHERE id = ?1", params![job.memory_id], |r| r.get(0)))?;

    let prompt = format!(
        "Extract atomic facts and entity relationships from this note.\n\
         Respond as JSON: {{\"facts\": [{{\"content\": str, \"type\": str, \"confidence\": number}}], \
         \"entities\": [{{\"source\": str, \"relationship\": str, \"target\": str, \"confidence\": number}}]}}\n\n\
         Note:\n{content}"
    );

    let raw = match ctx.llm.generate(&prompt, ctx.jobs.extract_timeout).await {
        Ok(text) => text,
        Err(e) if e.is_retryable() => return Err(provider_err(e)),
        Err(_) => {
            return Ok(json!({ "facts": [], "entityCount": 0, "warnings": ["provider unavailable"] }));
        }
    };

    let mut warnings = Vec::new();
    let parsed: RawExtractOutput = match serde_json::from_str(strip_code_fence(&raw)) {
        Ok(v) => v,
        Err(e) => {
            warnings.push(format!("unparseable extract output: {e}"));
            RawExtractOutput { facts: vec![], entities: vec![] }
        }
    };

    let facts = validate_facts(parsed.facts, &mut warnings);
    let relations = validate_entities(parsed.entities, &mut warnings);

    let entity_count = ctx.storage.write_txn(|tx| {
        let mut count = 0usize;
        for r in &relations {
            let source_id = upsert_entity(tx, &r.source, None)?;
            let target_id = upsert_entity(tx, &r.target, None)?;
            upsert_relation(tx, &source_id, &target_id, &r.relationship, r.confidence)?;
            link_mention(tx, &job.memory_id, &source_id)?;
            link_mention(tx, &job.memory_id, &target_id)?;
            count += 2;
        }
        tx.execute(
            "UPDATE memories SET extraction_status = ?1 WHERE id = ?2",
            params![if warnings.is_empty() { "completed" } else { "partial" }, job.memory_id],
        )?;
        Ok(count)
    })?;

    Ok(json!({ "facts": facts, "entityCount": entity_count, "warnings": warnings }))
}

struct Relation {
    source: String,
    relationship: String,
    target: String,
    confidence: f32,
}

fn validate_facts(raw: Vec<Value>, warnings: &mut Vec<String>) -> Vec<Value> {
    let mut facts = Vec::new();
    for item in raw.into_iter().take(MAX_FACTS) {
        let Some(content) = item.get("content").and_then(Value::as_str) else {
            warnings.push("fact missing content".to_string());
            continue;
        };
        if content.len() < FACT_MIN_LEN || content.len() > FACT_MAX_LEN {
            warnings.push(format!("fact content length {} out of bounds", content.len()));
            continue;
        }
        let fact_type = item.get("type").and_then(Value::as_str).unwrap_or("fact");
        let confidence = item.get("confidence").and_then(Value::as_f64).unwrap_or(0.5).clamp(0.0, 1.0);
        facts.push(json!({ "content": content, "type": fact_type, "confidence": confidence }));
    }
    facts
}

fn validate_entities(raw: Vec<Value>, warnings: &mut Vec<String>) -> Vec<Relation> {
    let mut relations = Vec::new();
    for item in raw.into_iter().take(MAX_ENTITIES) {
        let source = item.get("source").and_then(Value::as_str).unwrap_or("");
        let relationship = item.get("relationship").and_then(Value::as_str).unwrap_or("");
        let target = item.get("target").and_then(Value::as_str).unwrap_or("");
        if source.is_empty() || relationship.is_empty() || target.is_empty() {
            warnings.push("entity relation missing source/relationship/target".to_string());
            continue;
        }
        let confidence = item.get("confidence").and_then(Value::as_f64).unwrap_or(0.5).clamp(0.0, 1.0) as f32;
        relations.push(Relation {
            source: source.to_string(),
            relationship: relationship.to_string(),
            target: target.to_string(),
            confidence,
        });
    }
    relations
}

/// Runs the `decide` (shadow) stage: for each fact extracted upstream,
/// proposes add/update/delete/none without mutating memories.
pub async fn run_decide(ctx: &PipelineContext, job: &LeasedJob) -> Result<Value> {
    let facts: Vec<Value> = job
        .payload
        .as_ref()
        .and_then(|p| p.get("facts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut proposals = Vec::new();
    let mut warnings = Vec::new();

    for fact in &facts {
        let Some(content) = fact.get("content").and_then(Value::as_str) else { continue };

        let candidates = ctx
            .recall
            .recall(
                RecallQuery { text: content.to_string(), limit: DECIDE_CANDIDATES, ..Default::default() },
                RecallContext::Decision,
            )
            .await?;

        if candidates.is_empty() {
            proposals.push(json!({
                "action": "add",
                "confidence": fact.get("confidence").cloned().unwrap_or(json!(0.5)),
                "reason": "no similar memory found",
            }));
            continue;
        }

        let candidate_list = candidates
            .iter()
            .map(|c| format!("- {} ({}): {}", c.id, c.memory_type, c.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "A new fact was extracted: \"{content}\"\n\
             Existing candidate memories:\n{candidate_list}\n\n\
             Respond as JSON: {{\"action\": \"add\"|\"update\"|\"delete\"|\"none\", \"targetId\"?: str, \
             \"confidence\": number, \"reason\": str}}"
        );

        let raw = match ctx.llm.generate(&prompt, ctx.jobs.decide_timeout).await {
            Ok(text) => text,
            Err(e) if e.is_retryable() => return Err(provider_err(e)),
            Err(_) => {
                warnings.push("provider unavailable for decide".to_string());
                continue;
            }
        };

        let decision: RawDecideOutput = match serde_json::from_str(strip_code_fence(&raw)) {
            Ok(v) => v,
            Err(e) => {
                warnings.push(format!("unparseable decide output: {e}"));
                continue;
            }
        };

        if !["add", "update", "delete", "none"].contains(&decision.action.as_str()) {
            warnings.push(format!("invalid action: {}", decision.action));
            continue;
        }
        if decision.reason.trim().is_empty() {
            warnings.push("decide output missing reason".to_string());
            continue;
        }
        if matches!(decision.action.as_str(), "update" | "delete") {
            let Some(target) = &decision.target_id else {
                warnings.push(format!("{} requires targetId", decision.action));
                continue;
            };
            if !candidates.iter().any(|c| &c.id == target) {
                warnings.push("targetId was not among presented candidates".to_string());
                continue;
            }
        }

        proposals.push(json!({
            "action": decision.action,
            "targetId": decision.target_id,
            "confidence": decision.confidence.clamp(0.0, 1.0),
            "reason": decision.reason,
        }));
    }

    Ok(json!({ "proposals": proposals, "warnings": warnings }))
}

/// Runs the `embed` stage: computes and stores a dense vector for a
/// memory's content.
pub async fn run_embed(ctx: &PipelineContext, job: &LeasedJob) -> Result<Value> {
    let content: String = ctx
        .storage
        .read(|conn| conn.query_row("SELECT content FROM memories WHERE id = ?1", params![job.memory_id], |r| r.get(0)))?;

    let cfg = EmbedConfig::default();
    let vector = match ctx.embedder.embed(&content, &cfg).await {
        Ok(v) => v,
        Err(e) if e.is_retryable() => return Err(provider_err(e)),
        Err(_) => return Ok(json!({ "embedded": false, "reason": "provider unavailable" })),
    };

    let Some(vector) = vector else {
        return Ok(json!({ "embedded": false, "reason": "embedder returned no vector" }));
    };

    let model = cfg.model.clone().unwrap_or_else(|| "default".to_string());
    let dimensions = vector.len() as i64;
    let bytes = pack_vector(&vector);

    ctx.storage.write_txn(|tx| {
        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO embeddings (id, source_type, source_id, model, dimensions, vector, created_at, updated_at)
             VALUES (?1,'memory',?2,?3,?4,?5,?6,?6)
             ON CONFLICT(source_type, source_id) DO UPDATE SET
                model = excluded.model, dimensions = excluded.dimensions, vector = excluded.vector, updated_at = excluded.updated_at",
            params![uuid::Uuid::new_v4().to_string(), job.memory_id, model, dimensions, bytes, now],
        )?;
        tx.execute("UPDATE memories SET embedding_model = ?1 WHERE id = ?2", params![model, job.memory_id])?;
        Ok(())
    })?;

    Ok(json!({ "embedded": true, "dimensions": dimensions }))
}

fn provider_err(e: ProviderError) -> CoreError {
    CoreError::Validation(format!("provider error: {e}"))
}

/// Strips Markdown code fences (```json ... ```) some providers wrap JSON
/// in before parsing.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(stripped) = trimmed.strip_prefix("```") {
        let without_lang = stripped.trim_start_matches(|c: char| c.is_alphanumeric());
        without_lang.trim().trim_end_matches("```").trim()
    } else {
        trimmed
    }
}
