//! Fixed-capacity latency ring with lazily-sorted percentile queries
//! (spec.md §4.7).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatencyKind {
    Remember,
    Recall,
    Mutate,
    Jobs,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyPercentiles {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub count: usize,
    pub mean: f64,
}

pub struct LatencyHistograms {
    capacity: usize,
    samples: Mutex<HashMap<LatencyKind, VecDeque<u64>>>,
}

impl LatencyHistograms {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, samples: Mutex::new(HashMap::new()) }
    }

    pub fn record(&self, kind: LatencyKind, millis: u64) {
        let mut samples = self.samples.lock().unwrap();
        let ring = samples.entry(kind).or_default();
        ring.push_back(millis);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    pub fn percentiles(&self, kind: LatencyKind) -> LatencyPercentiles {
        let samples = self.samples.lock().unwrap();
        let Some(ring) = samples.get(&kind) else { return LatencyPercentiles::default() };
        if ring.is_empty() {
            return LatencyPercentiles::default();
        }
        let mut sorted: Vec<u64> = ring.iter().copied().collect();
        sorted.sort_unstable();
        let count = sorted.len();
        let mean = sorted.iter().sum::<u64>() as f64 / count as f64;
        LatencyPercentiles {
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            count,
            mean,
        }
    }

    pub fn reset(&self) {
        self.samples.lock().unwrap().clear();
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_computed_over_samples() {
        let histograms = LatencyHistograms::new(1000);
        for ms in 1..=100u64 {
            histograms.record(LatencyKind::Recall, ms);
        }
        let p = histograms.percentiles(LatencyKind::Recall);
        assert_eq!(p.count, 100);
        assert_eq!(p.p50, 50);
        assert_eq!(p.p99, 99);
    }

    #[test]
    fn ring_caps_at_capacity() {
        let histograms = LatencyHistograms::new(5);
        for ms in 0..10u64 {
            histograms.record(LatencyKind::Jobs, ms);
        }
        let p = histograms.percentiles(LatencyKind::Jobs);
        assert_eq!(p.count, 5);
    }

    #[test]
    fn reset_clears_all_kinds() {
        let histograms = LatencyHistograms::new(10);
        histograms.record(LatencyKind::Mutate, 5);
        histograms.reset();
        assert_eq!(histograms.percentiles(LatencyKind::Mutate).count, 0);
    }
}
