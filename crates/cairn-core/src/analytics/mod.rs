//! Observability surface: request/provider counters, an error ring, latency
//! histograms, a health diagnostic composite, and per-memory timelines
//! (spec.md §4.7). Carried as ambient infrastructure the way the teacher
//! carries its own metrics module, independent of which memory features
//! are in scope.

mod diagnostics;
mod errors;
mod latency;
mod stats;
mod timeline;

pub use diagnostics::{DiagnosticsReport, DomainHealth, HealthStatus, compose as diagnose};
pub use errors::{ErrorEntry, ErrorRing, ErrorStage};
pub use latency::{LatencyHistograms, LatencyKind, LatencyPercentiles};
pub use stats::{ActorOp, ActorStats, EndpointStats, ProviderOutcome, ProviderStats, StatsCollector, infer_actor_op};
pub use timeline::{TimelineEvent, TimelineEventKind, build as build_timeline, resolve_memory_id};

use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::storage::Storage;

/// Bundles the in-process analytics state the daemon holds for its
/// lifetime. Nothing here persists across a restart.
pub struct Analytics {
    pub stats: StatsCollector,
    pub errors: ErrorRing,
    pub latency: LatencyHistograms,
}

impl Analytics {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            stats: StatsCollector::new(config.provider_ring_capacity),
            errors: ErrorRing::new(config.error_ring_capacity),
            latency: LatencyHistograms::new(config.latency_ring_capacity),
        }
    }

    pub fn diagnostics(&self, storage: &Storage) -> Result<DiagnosticsReport> {
        diagnose(storage, self.stats.provider_snapshot())
    }

    pub fn timeline(&self, storage: &Storage, id: &str) -> Result<Vec<TimelineEvent>> {
        match resolve_memory_id(storage, id)? {
            Some(memory_id) => build_timeline(storage, &self.errors, &memory_id),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytics_bundles_default_capacities_from_config() {
        let config = AnalyticsConfig::default();
        let analytics = Analytics::new(&config);
        assert_eq!(analytics.stats.provider_snapshot().success, 0);
    }

    #[test]
    fn timeline_returns_empty_for_unknown_id() {
        let analytics = Analytics::new(&AnalyticsConfig::default());
        let storage = Storage::open(None).unwrap();
        let events = analytics.timeline(&storage, "does-not-exist").unwrap();
        assert!(events.is_empty());
    }
}
