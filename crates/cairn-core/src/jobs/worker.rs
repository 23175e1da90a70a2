//! Worker loop: lease a batch, dispatch by job type, complete/fail
//! (spec.md §4.2).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use super::pipeline::{PipelineContext, run_decide, run_embed, run_extract};
use super::queue::JobQueue;
use super::types::{JobType, LeasedJob};

pub struct Worker {
    worker_id: String,
    queue: Arc<JobQueue>,
    ctx: Arc<PipelineContext>,
    poll_interval: Duration,
    batch_size: usize,
}

impl Worker {
    pub fn new(worker_id: impl Into<String>, queue: Arc<JobQueue>, ctx: Arc<PipelineContext>) -> Self {
        let poll_interval = ctx.jobs.poll_interval;
        let batch_size = ctx.jobs.batch_size;
        Self { worker_id: worker_id.into(), queue, ctx, poll_interval, batch_size }
    }

    /// Runs one lease-dispatch-resolve cycle, returning the number of jobs
    /// processed (0 means the caller should sleep `poll_interval`).
    pub async fn tick(&self) -> crate::error::Result<usize> {
        let leased = self.queue.lease(&self.worker_id, self.batch_size)?;
        if leased.is_empty() {
            return Ok(0);
        }
        for job in &leased {
            self.dispatch(job).await;
        }
        Ok(leased.len())
    }

    async fn dispatch(&self, job: &LeasedJob) {
        let job_timeout = match job.job_type {
            JobType::Extract => self.ctx.jobs.extract_timeout,
            JobType::Decide => self.ctx.jobs.decide_timeout,
            JobType::Embed => self.ctx.jobs.embed_timeout,
            JobType::Summarize => self.ctx.jobs.summarize_timeout,
        };

        let outcome = timeout(job_timeout, self.run(job)).await;

        match outcome {
            Ok(Ok(result)) => {
                if let Err(e) = self.queue.complete(&job.id, Some(result.clone())) {
                    tracing::error!(job_id = %job.id, error = %e, "failed to mark job completed");
                    return;
                }
                if job.job_type == JobType::Extract {
                    let facts = result.get("facts").cloned().unwrap_or(json!([]));
                    if let Err(e) =
                        self.queue.enqueue(JobType::Decide, &job.memory_id, Some(json!({ "facts": facts })))
                    {
                        tracing::error!(job_id = %job.id, error = %e, "failed to enqueue decide job");
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job.id, job_type = job.job_type.as_str(), error = %e, "job attempt failed");
                let _ = self.queue.fail(&job.id, &e.to_string());
            }
            Err(_) => {
                tracing::warn!(job_id = %job.id, job_type = job.job_type.as_str(), "job attempt timed out");
                let _ = self.queue.fail(&job.id, "timeout");
            }
        }
    }

    async fn run(&self, job: &LeasedJob) -> crate::error::Result<serde_json::Value> {
        match job.job_type {
            JobType::Extract => run_extract(&self.ctx, job).await,
            JobType::Decide => run_decide(&self.ctx, job).await,
            JobType::Embed => run_embed(&self.ctx, job).await,
            JobType::Summarize => {
                Err(crate::error::CoreError::Validation("summarize jobs use the summary_job queue".into()))
            }
        }
    }

    /// Runs forever, sleeping `poll_interval` when nothing was leased, until
    /// `shutdown` resolves.
    pub async fn run_forever(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                result = self.tick() => {
                    match result {
                        Ok(0) => tokio::time::sleep(self.poll_interval).await,
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "worker tick failed");
                            tokio::time::sleep(self.poll_interval).await;
                        }
                    }
                }
            }
        }
    }
}
