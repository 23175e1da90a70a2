//! # cairn-core
//!
//! Storage, job pipeline, hybrid recall, and session continuity engine for
//! a local memory daemon used by AI coding agents. The daemon binary
//! (`cairn-daemon`) wires this crate to an HTTP surface; this crate has no
//! network code of its own.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod analytics;
pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod jobs;
pub mod memory;
pub mod providers;
pub mod recall;
pub mod session;
pub mod storage;
mod util;

pub use analytics::{Analytics, DiagnosticsReport, ErrorRing, HealthStatus, LatencyHistograms, StatsCollector, TimelineEvent};
pub use auth::{
    AuthPolicy, AuthRateLimiter, Claims, Permission, RateLimitedOp, Role, ScopeTarget, check_permission, check_scope,
};
pub use config::DaemonConfig;
pub use error::{CoreError, ProviderError, Result};
pub use jobs::{JobQueue, JobStatus, JobType, LeasedJob, PipelineContext};
pub use memory::{
    ForgetMode, ForgetOutcome, ForgetPreview, ForgetSelector, HistoryEvent, IngestEnvelope,
    IngestResult, JobScheduler, Memory, MemoryHistoryRow, MemoryPatch, MemoryStore, MemoryType,
    PatchResult, UpdateResult,
};
pub use providers::{EmbedConfig, Embedder, LlmProvider, NullEmbedder, NullProvider};
pub use recall::{RecallContext, RecallEngine, RecallQuery, RecallResult};
pub use session::{CheckpointTrigger, CheckpointWriter, SessionTracker};
pub use storage::Storage;

/// Crate version, surfaced in the daemon's `/status` response.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
