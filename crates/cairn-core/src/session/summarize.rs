//! Session summarization worker: transcripts in, a dated markdown note and
//! atomic facts out (spec.md §4.5).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{OptionalExtension, params};
use serde::Deserialize;
use serde_json::Value;

use crate::config::JobsConfig;
use crate::error::{CoreError, ProviderError, Result};
use crate::providers::LlmProvider;
use crate::storage::Storage;
use crate::util::{collapse_whitespace, content_hash, is_near_duplicate, normalize_content};

const MAX_TRANSCRIPT_CHARS: usize = 24_000;
const MAX_FILENAME_SLUG_CHARS: usize = 50;

pub struct SummaryJob {
    pub id: String,
    pub harness: Option<String>,
    pub project: Option<String>,
    pub session_key: Option<String>,
    pub transcript: String,
    pub attempts: i64,
    pub max_attempts: i64,
}

/// Enqueues a transcript for asynchronous summarization, returning the job id.
pub fn enqueue_summary_job(
    storage: &Storage,
    harness: Option<&str>,
    transcript: &str,
    session_key: Option<&str>,
    project: Option<&str>,
) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    storage.write(|conn| {
        conn.execute(
            "INSERT INTO summary_jobs (id, session_key, harness, project, transcript, status, attempts, created_at)
             VALUES (?1,?2,?3,?4,?5,'pending',0,?6)",
            params![id, session_key, harness, project, transcript, now],
        )
    })?;
    Ok(id)
}

/// Leases a pending summary job, following the same lease discipline as
/// `jobs::JobQueue` (spec.md §4.2, reused here for `summary_jobs`).
pub fn lease_summary_job(storage: &Storage, worker_id: &str, lease_timeout: std::time::Duration) -> Result<Option<SummaryJob>> {
    let now = Utc::now();
    storage.write_txn(|tx| {
        let cutoff = (now - chrono::Duration::from_std(lease_timeout).unwrap_or_default()).to_rfc3339();
        let row: Option<(String, Option<String>, Option<String>, Option<String>, String, i64, i64)> = tx
            .query_row(
                "SELECT id, session_key, harness, project, transcript, attempts, max_attempts FROM summary_jobs
                 WHERE status = 'pending' AND attempts < max_attempts AND (leased_at IS NULL OR leased_at < ?1)
                 ORDER BY created_at ASC LIMIT 1",
                params![cutoff],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?)),
            )
            .optional()?;

        let Some((id, session_key, harness, project, transcript, attempts, max_attempts)) = row else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE summary_jobs SET status = 'processing', attempts = attempts + 1, leased_at = ?1, worker_id = ?2 WHERE id = ?3",
            params![now.to_rfc3339(), worker_id, id],
        )?;

        Ok(Some(SummaryJob { id, harness, project, session_key, transcript, attempts: attempts + 1, max_attempts }))
    })
}

pub fn complete_summary_job(storage: &Storage, job_id: &str, result: &Value) -> Result<()> {
    storage.write(|conn| {
        conn.execute(
            "UPDATE summary_jobs SET status = 'completed', completed_at = ?1, result = ?2 WHERE id = ?3",
            params![Utc::now().to_rfc3339(), result.to_string(), job_id],
        )
    })?;
    Ok(())
}

pub fn fail_summary_job(storage: &Storage, job: &SummaryJob, error: &str) -> Result<()> {
    let status = if job.attempts >= job.max_attempts { "dead" } else { "pending" };
    storage.write(|conn| {
        conn.execute(
            "UPDATE summary_jobs SET status = ?1, error = ?2 WHERE id = ?3",
            params![status, error, job.id],
        )
    })?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RawSummaryOutput {
    summary: String,
    #[serde(default)]
    facts: Vec<RawFact>,
}

#[derive(Debug, Deserialize)]
struct RawFact {
    content: String,
    #[serde(default)]
    importance: Option<f32>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "type", default)]
    memory_type: Option<String>,
}

pub struct SummarizeOutcome {
    pub filename: String,
    pub facts_inserted: usize,
    pub facts_skipped_duplicate: usize,
}

/// Runs one summarization job to completion: prompt → LLM → parse → write
/// markdown note → insert deduplicated facts.
pub async fn run_summarize(
    storage: &Arc<Storage>,
    llm: &Arc<dyn LlmProvider>,
    jobs: &JobsConfig,
    memory_dir: &Path,
    job: &SummaryJob,
) -> Result<SummarizeOutcome> {
    let transcript = truncate_transcript(&job.transcript, MAX_TRANSCRIPT_CHARS);
    let prompt = build_prompt(&transcript, job.project.as_deref());

    let raw = llm
        .generate(&prompt, jobs.summarize_timeout)
        .await
        .map_err(|e: ProviderError| CoreError::Validation(format!("summarizer provider error: {e}")))?;

    let cleaned = strip_code_fence(&strip_chain_of_thought(&raw));
    let parsed: RawSummaryOutput = serde_json::from_str(cleaned)
        .map_err(|e| CoreError::Validation(format!("unparseable summary output: {e}")))?;

    let filename = derive_filename(memory_dir, &parsed.summary, job.project.as_deref())?;
    write_summary_file(memory_dir, &filename, &parsed.summary)?;

    let mut inserted = 0;
    let mut skipped = 0;
    for fact in &parsed.facts {
        if is_duplicate_of_existing(storage, &fact.content)? {
            skipped += 1;
            continue;
        }
        insert_fact(storage, fact, job.project.as_deref(), job.session_key.as_deref())?;
        inserted += 1;
    }

    if let Some(session_key) = &job.session_key {
        if let Err(e) = run_continuity_scoring(storage, llm, jobs, session_key, job.harness.as_deref(), job.project.as_deref()).await {
            tracing::warn!(session_key, error = %e, "continuity scoring sub-step failed, leaving summary outcome unaffected");
        }
    }

    Ok(SummarizeOutcome { filename, facts_inserted: inserted, facts_skipped_duplicate: skipped })
}

#[derive(Debug, Deserialize)]
struct ContinuityOutput {
    score: f32,
    #[serde(default)]
    memories_used: i64,
    #[serde(default)]
    novel_context_count: i64,
    reasoning: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    relevance: std::collections::HashMap<String, f32>,
}

fn build_continuity_prompt(injected: &[(String, String, String)]) -> String {
    let listing: String =
        injected.iter().map(|(prefix, _, content)| format!("- [{prefix}] {content}")).collect::<Vec<_>>().join("\n");
    format!(
        "The following memories were injected into this coding session's context:\n{listing}\n\n\
         Rate how well they covered the session's needs. Respond as JSON: \
         {{\"score\": number 0-1, \"memories_used\": integer, \"novel_context_count\": integer, \
         \"reasoning\": string, \"confidence\"?: number 0-1, \
         \"relevance\": {{\"<8-char-id-prefix>\": number 0-1, ...}}}}"
    )
}

/// Continuity scoring (spec.md §4.5 step 7): rebuilds the set of memories
/// injected into `session_key` (joined from `session_memories` rows with
/// `was_injected = 1`), asks the LLM to rate how well they covered the
/// session, and writes the result to `session_scores`. Per-memory relevance
/// in the response is keyed by an 8-char id prefix built from the injected
/// set only, and is written back onto the matching `session_memories` rows.
/// A no-op when nothing was injected this session (e.g. BM25-only recall
/// never ran in hook context, or the session had no recalls at all).
pub async fn run_continuity_scoring(
    storage: &Arc<Storage>,
    llm: &Arc<dyn LlmProvider>,
    jobs: &JobsConfig,
    session_key: &str,
    harness: Option<&str>,
    project: Option<&str>,
) -> Result<()> {
    let total_recalled: i64 = storage.read(|conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM session_memories WHERE session_key = ?1",
            params![session_key],
            |r| r.get(0),
        )
    })?;

    let injected: Vec<(String, String)> = storage.read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT sm.memory_id, m.content FROM session_memories sm
             JOIN memories m ON m.id = sm.memory_id
             WHERE sm.session_key = ?1 AND sm.was_injected = 1",
        )?;
        stmt.query_map(params![session_key], |r| Ok((r.get(0)?, r.get(1)?)))?.collect()
    })?;

    if injected.is_empty() {
        return Ok(());
    }

    let prefixed: Vec<(String, String, String)> = injected
        .into_iter()
        .map(|(memory_id, content)| {
            let prefix = memory_id.chars().take(8).collect::<String>();
            (prefix, memory_id, content)
        })
        .collect();

    let prompt = build_continuity_prompt(&prefixed);
    let raw = llm
        .generate(&prompt, jobs.decide_timeout)
        .await
        .map_err(|e: ProviderError| CoreError::Validation(format!("continuity scoring provider error: {e}")))?;

    let cleaned = strip_code_fence(&strip_chain_of_thought(&raw));
    let parsed: ContinuityOutput = serde_json::from_str(cleaned)
        .map_err(|e| CoreError::Validation(format!("unparseable continuity output: {e}")))?;

    let now = Utc::now().to_rfc3339();
    storage.write_txn(|tx| {
        tx.execute(
            "INSERT INTO session_scores
             (id, session_key, project, harness, score, memories_recalled, memories_used, novel_context_count, reasoning, confidence, continuity_reasoning, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                uuid::Uuid::new_v4().to_string(),
                session_key,
                project,
                harness,
                parsed.score,
                total_recalled,
                parsed.memories_used,
                parsed.novel_context_count,
                parsed.reasoning,
                parsed.confidence,
                parsed.reasoning,
                now,
            ],
        )?;

        for (prefix, memory_id, _) in &prefixed {
            if let Some(score) = parsed.relevance.get(prefix) {
                tx.execute(
                    "UPDATE session_memories SET relevance_score = ?1 WHERE session_key = ?2 AND memory_id = ?3",
                    params![score, session_key, memory_id],
                )?;
            }
        }
        Ok(())
    })?;

    Ok(())
}

fn truncate_transcript(transcript: &str, max_chars: usize) -> String {
    if transcript.chars().count() <= max_chars {
        transcript.to_string()
    } else {
        transcript.chars().take(max_chars).collect()
    }
}

fn build_prompt(transcript: &str, project: Option<&str>) -> String {
    let date = Utc::now().format("%Y-%m-%d");
    format!(
        "Summarize this coding session into a dated markdown note with `##` topic headings, \
         then extract atomic, durable facts worth remembering.\n\
         Date: {date}\n\
         Project: {project}\n\
         Respond as JSON: {{\"summary\": markdown string starting with a `##` heading, \
         \"facts\": [{{\"content\": str, \"importance\"?: number, \"tags\"?: [str], \"type\"?: str}}]}}\n\n\
         Transcript:\n{transcript}",
        project = project.unwrap_or("unknown"),
    )
}

fn strip_chain_of_thought(text: &str) -> String {
    static THINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
    THINK.replace_all(text, "").into_owned()
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(stripped) = trimmed.strip_prefix("```") {
        let without_lang = stripped.trim_start_matches(|c: char| c.is_alphanumeric());
        without_lang.trim().trim_end_matches("```").trim()
    } else {
        trimmed
    }
}

fn slugify(text: &str, max_chars: usize) -> String {
    static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
    let lower = text.to_lowercase();
    let slug = NON_WORD.replace_all(&lower, "-");
    let trimmed = slug.trim_matches('-');
    trimmed.chars().take(max_chars).collect::<String>().trim_end_matches('-').to_string()
}

fn derive_filename(memory_dir: &Path, summary: &str, project: Option<&str>) -> Result<String> {
    static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^##\s+(.+)$").unwrap());

    let date = Utc::now().format("%Y-%m-%d");
    let base = if let Some(caps) = HEADING.captures(summary) {
        slugify(&caps[1], MAX_FILENAME_SLUG_CHARS)
    } else {
        String::new()
    };
    let base = if base.is_empty() {
        let fallback = project
            .and_then(|p| p.rsplit(['/', '\\']).next())
            .filter(|s| !s.is_empty())
            .unwrap_or("session");
        slugify(fallback, MAX_FILENAME_SLUG_CHARS)
    } else {
        base
    };

    let mut candidate = format!("{date}-{base}.md");
    let mut suffix = 1u32;
    while memory_dir.join(&candidate).exists() {
        candidate = format!("{date}-{base}-{suffix}.md");
        suffix += 1;
    }
    Ok(candidate)
}

fn write_summary_file(memory_dir: &Path, filename: &str, summary: &str) -> Result<()> {
    std::fs::create_dir_all(memory_dir)?;
    let path: PathBuf = memory_dir.join(filename);
    std::fs::write(path, summary)?;
    Ok(())
}

fn is_duplicate_of_existing(storage: &Storage, content: &str) -> Result<bool> {
    let candidates: Vec<String> = storage.read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT content FROM memories WHERE is_deleted = 0 AND content_hash = ?1",
        )?;
        stmt.query_map(params![content_hash(&normalize_content(content))], |r| r.get(0))?.collect()
    })?;
    if !candidates.is_empty() {
        return Ok(true);
    }

    let near: Vec<String> = storage.read(|conn| {
        let mut stmt = conn.prepare("SELECT content FROM memories WHERE is_deleted = 0 LIMIT 500")?;
        stmt.query_map([], |r| r.get(0))?.collect()
    })?;
    Ok(near.iter().any(|existing| is_near_duplicate(existing, content)))
}

fn insert_fact(storage: &Storage, fact: &RawFact, project: Option<&str>, session_id: Option<&str>) -> Result<()> {
    let content = collapse_whitespace(&fact.content);
    let normalized = normalize_content(&content);
    let hash = content_hash(&normalized);
    let now = Utc::now().to_rfc3339();
    let id = uuid::Uuid::new_v4().to_string();
    let tags_json = serde_json::to_string(&fact.tags).unwrap_or_else(|_| "[]".to_string());
    let memory_type = fact.memory_type.as_deref().unwrap_or("fact");
    let importance = fact.importance.unwrap_or(0.5).clamp(0.0, 1.0);

    storage.write_txn(|tx| {
        tx.execute(
            "INSERT INTO memories
             (id, content, normalized_content, content_hash, type, importance, project, session_id, source_type, tags, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,'session_summary',?9,?10,?10)",
            params![id, content, normalized, hash, memory_type, importance, project, session_id, tags_json, now],
        )?;
        tx.execute(
            "INSERT INTO memory_history (id, memory_id, event, new_content, created_at)
             VALUES (?1,?2,'ADD',?3,?4)",
            params![uuid::Uuid::new_v4().to_string(), id, content, now],
        )?;
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::FakeLlm;

    #[test]
    fn slugify_produces_lowercase_dashed_string() {
        assert_eq!(slugify("Auth Middleware Rewrite!", 50), "auth-middleware-rewrite");
    }

    #[test]
    fn strip_chain_of_thought_removes_think_block() {
        let raw = "<think>reasoning here</think>{\"summary\":\"## x\",\"facts\":[]}";
        assert_eq!(strip_chain_of_thought(raw), "{\"summary\":\"## x\",\"facts\":[]}");
    }

    #[tokio::test]
    async fn run_summarize_writes_markdown_and_inserts_facts() {
        let storage = Arc::new(Storage::open(None).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let llm = FakeLlm::new(
            r#"{"summary": "## Auth rewrite\nDid some work.", "facts": [{"content": "Switched auth middleware to use HMAC session tokens instead of opaque ids."}]}"#,
        );
        let llm: Arc<dyn LlmProvider> = Arc::new(llm);

        let job_id = enqueue_summary_job(&storage, Some("claude-code"), "a very long transcript", Some("s1"), Some("/repo")).unwrap();
        let job = lease_summary_job(&storage, "worker-a", std::time::Duration::from_secs(120)).unwrap().unwrap();
        assert_eq!(job.id, job_id);

        let outcome = run_summarize(&storage, &llm, &JobsConfig::default(), dir.path(), &job).await.unwrap();
        assert_eq!(outcome.facts_inserted, 1);
        assert!(dir.path().join(&outcome.filename).exists());

        let count: i64 = storage.read(|conn| conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn run_summarize_skips_duplicate_facts() {
        let storage = Arc::new(Storage::open(None).unwrap());
        let dir = tempfile::tempdir().unwrap();
        storage
            .write_txn(|tx| {
                tx.execute(
                    "INSERT INTO memories (id, content, normalized_content, content_hash, created_at, updated_at)
                     VALUES ('m1','the user prefers dark mode in the editor','the user prefers dark mode in the editor', ?1, ?2, ?2)",
                    params![content_hash("the user prefers dark mode in the editor"), Utc::now().to_rfc3339()],
                )
            })
            .unwrap();

        let llm = FakeLlm::new(
            r#"{"summary": "## Prefs", "facts": [{"content": "the user prefers dark mode in editor settings"}]}"#,
        );
        let llm: Arc<dyn LlmProvider> = Arc::new(llm);

        let job_id = enqueue_summary_job(&storage, None, "transcript", None, None).unwrap();
        let job = lease_summary_job(&storage, "worker-a", std::time::Duration::from_secs(120)).unwrap().unwrap();
        assert_eq!(job.id, job_id);

        let outcome = run_summarize(&storage, &llm, &JobsConfig::default(), dir.path(), &job).await.unwrap();
        assert_eq!(outcome.facts_inserted, 0);
        assert_eq!(outcome.facts_skipped_duplicate, 1);
    }
}
