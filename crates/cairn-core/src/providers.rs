//! External capability contracts the core consumes: an LLM generation
//! endpoint and an embedding endpoint. The core never constructs a concrete
//! provider — callers (the daemon binary, or tests) supply one.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;

#[derive(Debug, Clone, Default)]
pub struct EmbedConfig {
    pub model: Option<String>,
    pub dimensions: Option<usize>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(
        &self,
        text: &str,
        cfg: &EmbedConfig,
    ) -> Result<Option<Vec<f32>>, ProviderError>;
}

/// Always-unavailable provider, used when no LLM is configured. Workers
/// treat `Unavailable` like any other provider error for retry purposes.
pub struct NullProvider;

#[async_trait]
impl LlmProvider for NullProvider {
    async fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable)
    }
}

/// Always-null embedder; recall falls back to BM25-only per spec.md §4.3.
pub struct NullEmbedder;

#[async_trait]
impl Embedder for NullEmbedder {
    async fn embed(
        &self,
        _text: &str,
        _cfg: &EmbedConfig,
    ) -> Result<Option<Vec<f32>>, ProviderError> {
        Ok(None)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Deterministic fake LLM: returns a canned response per exact prompt
    /// match (fallback to a default), used by pipeline/recall tests.
    pub struct FakeLlm {
        responses: Mutex<HashMap<String, String>>,
        default: String,
    }

    impl FakeLlm {
        pub fn new(default: impl Into<String>) -> Self {
            Self { responses: Mutex::new(HashMap::new()), default: default.into() }
        }

        pub fn set(&self, prompt_contains: impl Into<String>, response: impl Into<String>) {
            self.responses.lock().unwrap().insert(prompt_contains.into(), response.into());
        }
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        async fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String, ProviderError> {
            let responses = self.responses.lock().unwrap();
            for (needle, resp) in responses.iter() {
                if prompt.contains(needle.as_str()) {
                    return Ok(resp.clone());
                }
            }
            Ok(self.default.clone())
        }
    }

    /// Deterministic fake embedder producing a stable low-dimensional
    /// vector derived from the text's byte sum, so cosine similarity is
    /// meaningful in tests without pulling in a real model.
    pub struct FakeEmbedder {
        pub dimensions: usize,
    }

    impl FakeEmbedder {
        pub fn new(dimensions: usize) -> Self {
            Self { dimensions }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(
            &self,
            text: &str,
            _cfg: &EmbedConfig,
        ) -> Result<Option<Vec<f32>>, ProviderError> {
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
            Ok(Some(v))
        }
    }
}
