//! FIFO error ring buffer (spec.md §4.7).

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    Extraction,
    Decision,
    Embedding,
    Mutation,
    Connector,
}

#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: ErrorStage,
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
    pub memory_id: Option<String>,
    pub actor: Option<String>,
}

pub struct ErrorRing {
    capacity: usize,
    entries: Mutex<VecDeque<ErrorEntry>>,
}

impl ErrorRing {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    pub fn push(&self, entry: ErrorEntry) {
        let mut entries = self.entries.lock().unwrap();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<ErrorEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn matching(&self, predicate: impl Fn(&ErrorEntry) -> bool) -> Vec<ErrorEntry> {
        self.entries.lock().unwrap().iter().filter(|e| predicate(e)).cloned().collect()
    }

    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let ring = ErrorRing::new(2);
        for i in 0..3 {
            ring.push(ErrorEntry {
                timestamp: Utc::now(),
                stage: ErrorStage::Mutation,
                code: format!("E{i}"),
                message: "boom".to_string(),
                request_id: None,
                memory_id: None,
                actor: None,
            });
        }
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].code, "E1");
        assert_eq!(snapshot[1].code, "E2");
    }
}
