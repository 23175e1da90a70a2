//! Test data builders and a deterministic fake embedder, standing in for
//! `cairn-core`'s own `#[cfg(test)]`-only test doubles, which an external
//! workspace member can't reach.

use async_trait::async_trait;
use cairn_core::memory::IngestEnvelope;
use cairn_core::providers::{EmbedConfig, Embedder};
use cairn_core::error::ProviderError;

/// Builds an `IngestEnvelope` with every optional field defaulted, since
/// the type is `deny_unknown_fields` on the wire but has no `Default` impl
/// of its own (every field but `content` is meant to come from a caller).
pub fn envelope(content: &str) -> IngestEnvelope {
    IngestEnvelope {
        content: content.to_string(),
        importance: None,
        confidence: None,
        memory_type: None,
        tags: vec![],
        idempotency_key: None,
        project: None,
        session_id: None,
        who: None,
        source_type: None,
        runtime_path: None,
        pinned: false,
    }
}

pub fn envelope_with_key(content: &str, idempotency_key: &str) -> IngestEnvelope {
    IngestEnvelope { idempotency_key: Some(idempotency_key.to_string()), ..envelope(content) }
}

/// Deterministic embedder: same byte-sum-then-normalize scheme as
/// `cairn_core::providers::test_support::FakeEmbedder`, reimplemented here
/// since that module isn't reachable from outside the crate's own tests.
pub struct FakeEmbedder {
    pub dimensions: usize,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.dimensions] += b as f32;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str, _cfg: &EmbedConfig) -> Result<Option<Vec<f32>>, ProviderError> {
        Ok(Some(self.vector_for(text)))
    }
}
