//! Per-session in-memory activity tracker (spec.md §4.4).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::config::ContinuityConfig;

const MAX_PENDING_QUERIES: usize = 20;
const MAX_PENDING_REMEMBERS: usize = 10;
const MAX_PENDING_SNIPPETS: usize = 10;
const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_key: String,
    pub harness: Option<String>,
    pub project: Option<String>,
    pub project_normalized: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_checkpoint_at: DateTime<Utc>,
    pub prompt_count: u32,
    pub total_prompt_count: u32,
    pub pending_queries: VecDeque<String>,
    pub pending_remembers: VecDeque<String>,
    pub pending_prompt_snippets: VecDeque<String>,
}

impl SessionState {
    fn new(session_key: String, harness: Option<String>, project: Option<String>, project_normalized: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_key,
            harness,
            project,
            project_normalized,
            started_at: now,
            last_checkpoint_at: now,
            prompt_count: 0,
            total_prompt_count: 0,
            pending_queries: VecDeque::new(),
            pending_remembers: VecDeque::new(),
            pending_prompt_snippets: VecDeque::new(),
        }
    }
}

/// A consumed snapshot of interval state, produced by `consume`. Interval
/// counters and buffers are reset; `total_prompt_count` survives.
#[derive(Debug, Clone)]
pub struct CheckpointSnapshot {
    pub session_key: String,
    pub harness: Option<String>,
    pub project: Option<String>,
    pub project_normalized: Option<String>,
    pub prompt_count: u32,
    pub queries: Vec<String>,
    pub remembers: Vec<String>,
    pub digest: Option<String>,
}

fn push_capped(buf: &mut VecDeque<String>, item: String, cap: usize) {
    buf.push_back(item);
    while buf.len() > cap {
        buf.pop_front();
    }
}

/// Tracks per-session activity across prompts until a checkpoint is flushed.
#[derive(Default)]
pub struct SessionTracker {
    states: Mutex<HashMap<String, SessionState>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&self, session_key: &str, harness: Option<String>, project: Option<String>, project_normalized: Option<String>) {
        let mut states = self.states.lock().unwrap();
        states
            .entry(session_key.to_string())
            .or_insert_with(|| SessionState::new(session_key.to_string(), harness, project, project_normalized));
    }

    /// Rejects empty/whitespace-only snippets; `query_terms` and `snippet`
    /// are both optional.
    pub fn record_prompt(&self, session_key: &str, query_terms: Option<Vec<String>>, snippet: Option<&str>) {
        let mut states = self.states.lock().unwrap();
        let Some(state) = states.get_mut(session_key) else { return };

        state.prompt_count += 1;
        state.total_prompt_count += 1;

        if let Some(terms) = query_terms {
            for term in terms {
                push_capped(&mut state.pending_queries, term, MAX_PENDING_QUERIES);
            }
        }

        if let Some(snippet) = snippet {
            let trimmed = snippet.trim();
            if !trimmed.is_empty() {
                let truncated: String = trimmed.chars().take(SNIPPET_MAX_CHARS).collect();
                push_capped(&mut state.pending_prompt_snippets, truncated, MAX_PENDING_SNIPPETS);
            }
        }
    }

    pub fn record_remember(&self, session_key: &str, content: &str) {
        let mut states = self.states.lock().unwrap();
        let Some(state) = states.get_mut(session_key) else { return };
        push_capped(&mut state.pending_remembers, content.to_string(), MAX_PENDING_REMEMBERS);
    }

    pub fn should_checkpoint(&self, session_key: &str, config: &ContinuityConfig) -> bool {
        if !config.enabled {
            return false;
        }
        let states = self.states.lock().unwrap();
        let Some(state) = states.get(session_key) else { return false };
        let elapsed = Utc::now().signed_duration_since(state.last_checkpoint_at);
        let time_interval = chrono::Duration::from_std(config.time_interval).unwrap_or_default();
        elapsed >= time_interval || state.prompt_count >= config.prompt_interval
    }

    /// Returns a snapshot of interval state and resets interval counters and
    /// buffers. `total_prompt_count` is untouched.
    pub fn consume(&self, session_key: &str) -> Option<CheckpointSnapshot> {
        let mut states = self.states.lock().unwrap();
        let state = states.get_mut(session_key)?;

        let digest = if state.pending_prompt_snippets.is_empty() {
            None
        } else {
            Some(state.pending_prompt_snippets.iter().cloned().collect::<Vec<_>>().join("\n"))
        };

        let snapshot = CheckpointSnapshot {
            session_key: state.session_key.clone(),
            harness: state.harness.clone(),
            project: state.project.clone(),
            project_normalized: state.project_normalized.clone(),
            prompt_count: state.prompt_count,
            queries: state.pending_queries.iter().cloned().collect(),
            remembers: state.pending_remembers.iter().cloned().collect(),
            digest,
        };

        state.prompt_count = 0;
        state.pending_queries.clear();
        state.pending_remembers.clear();
        state.pending_prompt_snippets.clear();
        state.last_checkpoint_at = Utc::now();

        Some(snapshot)
    }

    pub fn clear(&self, session_key: &str) {
        self.states.lock().unwrap().remove(session_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_prompt_rejects_whitespace_snippet() {
        let tracker = SessionTracker::new();
        tracker.init("s1", None, None, None);
        tracker.record_prompt("s1", None, Some("   "));
        let snapshot = tracker.consume("s1").unwrap();
        assert!(snapshot.digest.is_none());
    }

    #[test]
    fn buffers_are_capped_and_evict_oldest() {
        let tracker = SessionTracker::new();
        tracker.init("s1", None, None, None);
        for i in 0..30 {
            tracker.record_prompt("s1", Some(vec![format!("term{i}")]), None);
        }
        let snapshot = tracker.consume("s1").unwrap();
        assert_eq!(snapshot.queries.len(), MAX_PENDING_QUERIES);
        assert_eq!(snapshot.queries.first().unwrap(), "term10");
    }

    #[test]
    fn consume_resets_interval_but_not_total() {
        let tracker = SessionTracker::new();
        tracker.init("s1", None, None, None);
        tracker.record_prompt("s1", None, None);
        tracker.record_prompt("s1", None, None);
        let snapshot = tracker.consume("s1").unwrap();
        assert_eq!(snapshot.prompt_count, 2);

        tracker.record_prompt("s1", None, None);
        let second = tracker.consume("s1").unwrap();
        assert_eq!(second.prompt_count, 1);

        let states = tracker.states.lock().unwrap();
        assert_eq!(states.get("s1").unwrap().total_prompt_count, 3);
    }

    #[test]
    fn should_checkpoint_true_once_prompt_interval_reached() {
        let tracker = SessionTracker::new();
        tracker.init("s1", None, None, None);
        let config = ContinuityConfig { prompt_interval: 2, ..ContinuityConfig::default() };
        tracker.record_prompt("s1", None, None);
        assert!(!tracker.should_checkpoint("s1", &config));
        tracker.record_prompt("s1", None, None);
        assert!(tracker.should_checkpoint("s1", &config));
    }
}
