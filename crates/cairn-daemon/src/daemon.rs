//! The `Daemon` aggregate: one struct wiring storage, the job pipeline,
//! recall, session continuity, analytics, and auth together, constructed
//! once in `main` and passed by `Arc` into every handler and background
//! task (spec.md §9 "construct a Daemon aggregate").

use std::sync::Arc;

use cairn_core::auth::AuthPolicy;
use cairn_core::config::DaemonConfig;
use cairn_core::jobs::{JobQueue, PipelineContext, Worker};
use cairn_core::providers::{Embedder, LlmProvider};
use cairn_core::recall::RecallEngine;
use cairn_core::session::{CheckpointWriter, SessionTracker};
use cairn_core::storage::Storage;
use cairn_core::{Analytics, MemoryStore};

pub struct Daemon {
    pub store: Arc<MemoryStore>,
    pub jobs: Arc<JobQueue>,
    pub recall: Arc<RecallEngine>,
    pub sessions: Arc<SessionTracker>,
    pub checkpoints: Arc<CheckpointWriter>,
    pub analytics: Arc<Analytics>,
    pub auth: Arc<AuthPolicy>,
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn Embedder>,
}

impl Daemon {
    pub fn new(
        storage: Arc<Storage>,
        config: DaemonConfig,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let jobs = Arc::new(JobQueue::new(storage.clone(), config.jobs.clone()));
        let recall = Arc::new(RecallEngine::new(storage.clone(), embedder.clone(), config.recall.clone()));
        let store = Arc::new(MemoryStore::with_scheduler(storage.clone(), config.as_ref(), jobs.clone()));
        let sessions = Arc::new(SessionTracker::new());
        let checkpoints = CheckpointWriter::new(storage.clone(), config.continuity.clone());
        let analytics = Arc::new(Analytics::new(&config.analytics));
        let auth = Arc::new(AuthPolicy::new(config.auth.mode, &config.rate_limits));

        Arc::new(Self {
            store,
            jobs,
            recall,
            sessions,
            checkpoints,
            analytics,
            auth,
            config,
            storage,
            llm,
            embedder,
        })
    }

    fn pipeline_context(&self) -> Arc<PipelineContext> {
        Arc::new(PipelineContext {
            storage: self.storage.clone(),
            llm: self.llm.clone(),
            embedder: self.embedder.clone(),
            recall: self.recall.clone(),
            jobs: self.config.jobs.clone(),
        })
    }

    /// Spawns the pipeline workers, retention sweeper, checkpoint pruner,
    /// and summarization worker as plain `tokio::spawn` loops, each exiting
    /// on the shared shutdown watch channel — the same shape the teacher
    /// uses for its periodic consolidation loop in `main.rs`, generalized
    /// to multiple independent loops instead of one.
    pub fn spawn_background_tasks(
        self: &Arc<Self>,
        worker_count: usize,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        for i in 0..worker_count {
            let ctx = self.pipeline_context();
            let queue = self.jobs.clone();
            let worker = Worker::new(format!("worker-{i}"), queue, ctx);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(worker.run_forever(shutdown)));
        }

        handles.push(self.spawn_retention_sweeper(shutdown.clone()));
        handles.push(self.spawn_checkpoint_pruner(shutdown.clone()));
        handles.push(self.spawn_summarizer(shutdown));

        handles
    }

    fn spawn_retention_sweeper(self: &Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let storage = self.storage.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(config.retention.sweep_interval) => {
                        match cairn_core::jobs::sweep(&storage, &config.retention) {
                            Ok(report) => tracing::info!(?report, "retention sweep complete"),
                            Err(e) => tracing::error!(error = %e, "retention sweep failed"),
                        }
                    }
                }
            }
        })
    }

    fn spawn_checkpoint_pruner(self: &Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let storage = self.storage.clone();
        let retention_days = self.config.continuity.retention_days;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_secs(3600)) => {
                        match cairn_core::session::prune(&storage, retention_days) {
                            Ok(n) if n > 0 => tracing::info!(pruned = n, "pruned stale checkpoints"),
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "checkpoint prune failed"),
                        }
                    }
                }
            }
        })
    }

    fn spawn_summarizer(self: &Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let storage = self.storage.clone();
        let llm = self.llm.clone();
        let jobs_config = self.config.jobs.clone();
        let memory_dir = self.config.memory_dir.clone();
        let poll_interval = jobs_config.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    leased = async { cairn_core::session::lease_summary_job(&storage, "summarizer", jobs_config.lease_timeout) } => {
                        match leased {
                            Ok(Some(job)) => {
                                let job_id = job.id.clone();
                                match cairn_core::session::run_summarize(&storage, &llm, &jobs_config, &memory_dir, &job).await {
                                    Ok(outcome) => {
                                        let result = serde_json::json!({
                                            "filename": outcome.filename,
                                            "factsInserted": outcome.facts_inserted,
                                            "factsSkippedDuplicate": outcome.facts_skipped_duplicate,
                                        });
                                        if let Err(e) = cairn_core::session::complete_summary_job(&storage, &job_id, &result) {
                                            tracing::error!(error = %e, "failed to mark summary job complete");
                                        }
                                    }
                                    Err(e) => {
                                        if let Err(e2) = cairn_core::session::fail_summary_job(&storage, &job, &e.to_string()) {
                                            tracing::error!(error = %e2, "failed to mark summary job failed");
                                        }
                                    }
                                }
                            }
                            Ok(None) => tokio::time::sleep(poll_interval).await,
                            Err(e) => {
                                tracing::error!(error = %e, "summary job lease failed");
                                tokio::time::sleep(poll_interval).await;
                            }
                        }
                    }
                }
            }
        })
    }
}
