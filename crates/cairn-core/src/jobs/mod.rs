//! Durable job queue, pipeline stages, retention sweeper, and the worker
//! loop that ties them together (spec.md §4.2).

mod pipeline;
mod queue;
mod retention;
mod types;
mod worker;

pub use pipeline::{PipelineContext, run_decide, run_embed, run_extract};
pub use queue::JobQueue;
pub use retention::{SweepReport, sweep};
pub use types::{JobStatus, JobType, LeasedJob};
pub use worker::Worker;
