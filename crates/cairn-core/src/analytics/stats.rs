//! In-memory endpoint/actor/provider counters (spec.md §4.7).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointStats {
    pub count: u64,
    pub errors: u64,
    pub total_latency_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActorStats {
    pub requests: u64,
    pub remembers: u64,
    pub recalls: u64,
    pub mutations: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderStats {
    pub success: u64,
    pub failure: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorOp {
    Remember,
    Recall,
    Mutation,
    Other,
}

/// Infers the actor-stat bucket from a request path, per spec.md §4.7
/// ("the op kind is inferred from the path").
pub fn infer_actor_op(path: &str) -> ActorOp {
    if path.contains("/remember") {
        ActorOp::Remember
    } else if path.contains("/recall") {
        ActorOp::Recall
    } else if path.contains("/modify") || path.contains("/forget") || path.contains("/recover") {
        ActorOp::Mutation
    } else {
        ActorOp::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOutcome {
    Success,
    Failure,
    Timeout,
}

pub struct StatsCollector {
    endpoints: Mutex<HashMap<String, EndpointStats>>,
    actors: Mutex<HashMap<String, ActorStats>>,
    provider_ring: Mutex<VecDeque<ProviderOutcome>>,
    provider_capacity: usize,
    connectors: Mutex<HashMap<String, ProviderStats>>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new(200)
    }
}

impl StatsCollector {
    /// `provider_capacity` bounds the rolling window diagnostics computes
    /// availability over (spec.md §4.7's "200-sample ring").
    pub fn new(provider_capacity: usize) -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            actors: Mutex::new(HashMap::new()),
            provider_ring: Mutex::new(VecDeque::with_capacity(provider_capacity)),
            provider_capacity,
            connectors: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_endpoint(&self, method: &str, path: &str, latency_ms: u64, is_error: bool) {
        let key = format!("{method} {path}");
        let mut endpoints = self.endpoints.lock().unwrap();
        let entry = endpoints.entry(key).or_default();
        entry.count += 1;
        entry.total_latency_ms += latency_ms;
        if is_error {
            entry.errors += 1;
        }
    }

    pub fn record_actor(&self, actor: &str, path: &str) {
        let mut actors = self.actors.lock().unwrap();
        let entry = actors.entry(actor.to_string()).or_default();
        entry.requests += 1;
        match infer_actor_op(path) {
            ActorOp::Remember => entry.remembers += 1,
            ActorOp::Recall => entry.recalls += 1,
            ActorOp::Mutation => entry.mutations += 1,
            ActorOp::Other => {}
        }
    }

    pub fn record_provider(&self, outcome: ProviderOutcome) {
        let mut ring = self.provider_ring.lock().unwrap();
        ring.push_back(outcome);
        while ring.len() > self.provider_capacity {
            ring.pop_front();
        }
    }

    pub fn record_connector(&self, connector: &str, outcome: ProviderOutcome) {
        let mut connectors = self.connectors.lock().unwrap();
        record_outcome(connectors.entry(connector.to_string()).or_default(), outcome);
    }

    pub fn endpoint_snapshot(&self) -> HashMap<String, EndpointStats> {
        self.endpoints.lock().unwrap().clone()
    }

    pub fn actor_snapshot(&self) -> HashMap<String, ActorStats> {
        self.actors.lock().unwrap().clone()
    }

    pub fn provider_snapshot(&self) -> ProviderStats {
        let ring = self.provider_ring.lock().unwrap();
        let mut stats = ProviderStats::default();
        for outcome in ring.iter() {
            record_outcome(&mut stats, *outcome);
        }
        stats
    }

    pub fn reset(&self) {
        self.endpoints.lock().unwrap().clear();
        self.actors.lock().unwrap().clear();
        self.provider_ring.lock().unwrap().clear();
        self.connectors.lock().unwrap().clear();
    }
}

fn record_outcome(stats: &mut ProviderStats, outcome: ProviderOutcome) {
    match outcome {
        ProviderOutcome::Success => stats.success += 1,
        ProviderOutcome::Failure => stats.failure += 1,
        ProviderOutcome::Timeout => stats.timeout += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_stats_accumulate_count_errors_latency() {
        let stats = StatsCollector::default();
        stats.record_endpoint("POST", "/api/memory", 12, false);
        stats.record_endpoint("POST", "/api/memory", 8, true);
        let snapshot = stats.endpoint_snapshot();
        let entry = snapshot.get("POST /api/memory").unwrap();
        assert_eq!(entry.count, 2);
        assert_eq!(entry.errors, 1);
        assert_eq!(entry.total_latency_ms, 20);
    }

    #[test]
    fn actor_op_inferred_from_path() {
        let stats = StatsCollector::default();
        stats.record_actor("agent-1", "/api/recall");
        stats.record_actor("agent-1", "/api/memory/forget");
        let snapshot = stats.actor_snapshot();
        let entry = snapshot.get("agent-1").unwrap();
        assert_eq!(entry.requests, 2);
        assert_eq!(entry.recalls, 1);
        assert_eq!(entry.mutations, 1);
    }

    #[test]
    fn provider_ring_windows_to_capacity() {
        let stats = StatsCollector::new(3);
        stats.record_provider(ProviderOutcome::Failure);
        stats.record_provider(ProviderOutcome::Success);
        stats.record_provider(ProviderOutcome::Success);
        stats.record_provider(ProviderOutcome::Success);
        let snapshot = stats.provider_snapshot();
        assert_eq!(snapshot.success, 3);
        assert_eq!(snapshot.failure, 0);
    }
}
