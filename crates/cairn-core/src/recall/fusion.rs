//! Score fusion and recency/pin decay for hybrid recall (spec.md §4.3
//! steps 4-5).

use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Vector,
    Bm25,
    Hybrid,
}

/// Whether recall is being invoked to inject context into a hook (decay
/// applies) or to gather decision-worker candidates (raw fused score).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallContext {
    Hook,
    Decision,
}

/// Fuses BM25 and vector score maps per spec.md §4.3 step 4.
///
/// At the extremes (alpha=0 or alpha=1) a candidate present in only the
/// *other* index is dropped rather than kept at its raw, unweighted score
/// — otherwise alpha=1 wouldn't be pure vector-only ordering, it would be
/// "vector blended with any BM25-only stragglers" (spec.md §8's round-trip
/// property: "alpha=1 yields vector-only ordering; alpha=0 yields
/// BM25-only ordering").
pub fn fuse(
    bm25: &HashMap<String, f32>,
    vector: &HashMap<String, f32>,
    alpha: f32,
) -> HashMap<String, (f32, ResultSource)> {
    let mut fused = HashMap::new();
    for id in bm25.keys().chain(vector.keys()) {
        if fused.contains_key(id) {
            continue;
        }
        let b = bm25.get(id);
        let v = vector.get(id);
        let (score, source) = match (v, b) {
            (Some(v), Some(b)) => (alpha * v + (1.0 - alpha) * b, ResultSource::Hybrid),
            (Some(v), None) if alpha > 0.0 => (alpha * v, ResultSource::Vector),
            (None, Some(b)) if alpha < 1.0 => ((1.0 - alpha) * b, ResultSource::Bm25),
            _ => continue,
        };
        fused.insert(id.clone(), (score, source));
    }
    fused
}

/// Normalizes a raw BM25 score (more negative is better in SQLite's FTS5
/// `bm25()`) to `1 / (1 + |raw|)` so larger is better, per spec.md §4.3 step 2.
pub fn normalize_bm25(raw: f64) -> f32 {
    (1.0 / (1.0 + raw.abs())) as f32
}

/// Recency/pin decay applied only in the hook context (spec.md §4.3 step 5).
pub fn decay(pinned: bool, importance: f32, age_days: f64) -> f32 {
    if pinned {
        1.0
    } else {
        importance * 0.95f32.powf(age_days as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuse_prefers_hybrid_when_both_present() {
        let mut bm25 = HashMap::new();
        bm25.insert("a".to_string(), 0.5);
        let mut vector = HashMap::new();
        vector.insert("a".to_string(), 0.9);
        let fused = fuse(&bm25, &vector, 0.7);
        let (score, source) = fused["a"];
        assert_eq!(source, ResultSource::Hybrid);
        assert!((score - (0.7 * 0.9 + 0.3 * 0.5)).abs() < 1e-6);
    }

    #[test]
    fn decay_pins_to_one() {
        assert_eq!(decay(true, 0.1, 1000.0), 1.0);
    }

    #[test]
    fn decay_decreases_with_age() {
        let fresh = decay(false, 0.8, 0.0);
        let old = decay(false, 0.8, 30.0);
        assert!(old < fresh);
    }
}
