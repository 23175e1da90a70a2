//! Error taxonomy for the memory store, job pipeline, and recall engine.
//!
//! `CoreError` carries the client-visible kinds from the error-handling
//! design: validation failures and preconditions the caller can act on.
//! `ProviderError` is the capability-style result returned by the
//! `LlmProvider`/`Embedder` contracts — only `Timeout` and `Provider` feed
//! a job's retry counter.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found")]
    NotFound,

    #[error("reason is required")]
    MissingReason,

    #[error("version conflict, current version is {current}")]
    VersionConflict { current: i64 },

    #[error("pinned memory requires force")]
    PinnedRequiresForce,

    #[error("tombstone outside retention window, cannot recover")]
    RetentionExpired,

    #[error("batch operation of {count} items requires confirmation")]
    BatchConfirmRequired { count: usize, confirm_token: String },

    #[error("confirm token is invalid or expired")]
    BatchConfirmInvalid,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("schema or index invariant violated: {0}")]
    Corruption(String),
}

impl CoreError {
    /// Whether this error kind is safe to surface directly to an HTTP caller
    /// (as opposed to collapsing into a generic 500).
    pub fn is_client_visible(&self) -> bool {
        matches!(
            self,
            CoreError::NotFound
                | CoreError::MissingReason
                | CoreError::VersionConflict { .. }
                | CoreError::PinnedRequiresForce
                | CoreError::RetentionExpired
                | CoreError::BatchConfirmRequired { .. }
                | CoreError::BatchConfirmInvalid
                | CoreError::Validation(_)
                | CoreError::RateLimited { .. }
        )
    }
}

/// Result of calling an external LLM/embedding capability. Only `Timeout`
/// and `Provider` are retryable from a job's point of view; `ParseError`
/// means the provider answered but the payload didn't validate, which is
/// a permanent failure for that attempt.
#[non_exhaustive]
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("provider timed out")]
    Timeout,
    #[error("provider returned unparseable output: {0}")]
    ParseError(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("no provider configured")]
    Unavailable,
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Timeout | ProviderError::Provider(_))
    }
}
