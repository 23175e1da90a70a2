//! Configuration surface, following spec.md §6's recognized options.
//!
//! Every field has the default named in the spec; the daemon binary
//! overrides fields from environment variables (see `cairn-daemon::config`).
//! This module only defines the shapes — env parsing lives in the binary
//! crate so `cairn-core` stays environment-agnostic.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub tombstone: Duration,
    pub history: Duration,
    pub completed_job: Duration,
    pub dead_job: Duration,
    pub sweep_interval: Duration,
    pub batch_limit: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            tombstone: Duration::from_secs(30 * 86_400),
            history: Duration::from_secs(180 * 86_400),
            completed_job: Duration::from_secs(14 * 86_400),
            dead_job: Duration::from_secs(30 * 86_400),
            sweep_interval: Duration::from_secs(6 * 3600),
            batch_limit: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContinuityConfig {
    pub enabled: bool,
    pub prompt_interval: u32,
    pub time_interval: Duration,
    pub max_checkpoints_per_session: usize,
    pub retention_days: u32,
    pub recovery_budget_chars: usize,
    pub flush_delay: Duration,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt_interval: 5,
            time_interval: Duration::from_secs(15 * 60),
            max_checkpoints_per_session: 50,
            retention_days: 7,
            recovery_budget_chars: 2000,
            flush_delay: Duration::from_millis(2500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecallConfig {
    pub alpha: f32,
    pub top_k: usize,
    pub min_score: f32,
    pub recency_bias: f32,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            top_k: 20,
            min_score: 0.0,
            recency_bias: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    pub window: Duration,
    pub max: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitsConfig {
    pub forget: RateLimitRule,
    pub modify: RateLimitRule,
    pub batch_forget: RateLimitRule,
    pub force_delete: RateLimitRule,
    pub admin: RateLimitRule,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            forget: RateLimitRule { window: Duration::from_secs(60), max: 30 },
            modify: RateLimitRule { window: Duration::from_secs(60), max: 60 },
            batch_forget: RateLimitRule { window: Duration::from_secs(60), max: 5 },
            force_delete: RateLimitRule { window: Duration::from_secs(60), max: 3 },
            admin: RateLimitRule { window: Duration::from_secs(60), max: 10 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Local,
    LocalNoToken,
    Hybrid,
    Team,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub default_token_ttl: Duration,
    pub session_token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Local,
            default_token_ttl: Duration::from_secs(7 * 86_400),
            session_token_ttl: Duration::from_secs(86_400),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub poll_interval: Duration,
    pub lease_timeout: Duration,
    pub max_attempts: u32,
    pub batch_size: usize,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub extract_timeout: Duration,
    pub decide_timeout: Duration,
    pub embed_timeout: Duration,
    pub summarize_timeout: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            lease_timeout: Duration::from_secs(120),
            max_attempts: 3,
            batch_size: 10,
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(600),
            extract_timeout: Duration::from_secs(30),
            decide_timeout: Duration::from_secs(10),
            embed_timeout: Duration::from_secs(30),
            summarize_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub retention: RetentionConfig,
    pub continuity: ContinuityConfig,
    pub recall: RecallConfig,
    pub rate_limits: RateLimitsConfig,
    pub auth: AuthConfig,
    pub jobs: JobsConfig,
    /// Dedup window for `ingest`'s content-hash rule, spec.md §4.1.
    pub dedup_window_days: i64,
    pub analytics: AnalyticsConfig,
    /// Where the summarization worker writes dated markdown notes
    /// (spec.md §4.5 step 5).
    pub memory_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            retention: RetentionConfig::default(),
            continuity: ContinuityConfig::default(),
            recall: RecallConfig::default(),
            rate_limits: RateLimitsConfig::default(),
            auth: AuthConfig::default(),
            jobs: JobsConfig::default(),
            dedup_window_days: 7,
            analytics: AnalyticsConfig::default(),
            memory_dir: PathBuf::from(".cairn/memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub error_ring_capacity: usize,
    pub latency_ring_capacity: usize,
    pub provider_ring_capacity: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            error_ring_capacity: 500,
            latency_ring_capacity: 1000,
            provider_ring_capacity: 200,
        }
    }
}

impl DaemonConfig {
    pub fn new() -> Self {
        Self::default()
    }
}
