//! Durable job queue: enqueue/lease/complete/fail with at-least-once
//! delivery and dead-letter isolation (spec.md §4.2).

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rusqlite::params;

use crate::config::JobsConfig;
use crate::error::Result;
use crate::memory::JobScheduler;
use crate::storage::Storage;

use super::types::{JobType, LeasedJob};

pub struct JobQueue {
    storage: Arc<Storage>,
    config: JobsConfig,
}

impl JobQueue {
    pub fn new(storage: Arc<Storage>, config: JobsConfig) -> Self {
        Self { storage, config }
    }

    #[cfg(test)]
    pub(crate) fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn enqueue(&self, job_type: JobType, memory_id: &str, payload: Option<serde_json::Value>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let payload_json = payload.map(|p| p.to_string());
        self.storage.write(|conn| {
            conn.execute(
                "INSERT INTO memory_jobs (id, memory_id, job_type, status, attempts, max_attempts, payload, created_at)
                 VALUES (?1,?2,?3,'pending',0,?4,?5,?6)",
                params![id, memory_id, job_type.as_str(), self.config.max_attempts, payload_json, now.to_rfc3339()],
            )
        })?;
        Ok(id)
    }

    /// Atomically claims up to `batch` pending jobs, per spec.md §4.2's
    /// lease contract.
    pub fn lease(&self, worker_id: &str, batch: usize) -> Result<Vec<LeasedJob>> {
        let now = Utc::now();
        let lease_timeout = self.config.lease_timeout;
        self.storage.write_txn(|tx| {
            let cutoff = (now - chrono::Duration::from_std(lease_timeout).unwrap_or_default()).to_rfc3339();
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM memory_jobs
                     WHERE status = 'pending' AND attempts < max_attempts
                       AND (leased_at IS NULL OR leased_at < ?1)
                     ORDER BY created_at ASC LIMIT ?2",
                )?;
                stmt.query_map(params![cutoff, batch as i64], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?
            };

            let mut leased = Vec::with_capacity(ids.len());
            for id in &ids {
                tx.execute(
                    "UPDATE memory_jobs SET status = 'processing', attempts = attempts + 1,
                     leased_at = ?1, worker_id = ?2 WHERE id = ?3",
                    params![now.to_rfc3339(), worker_id, id],
                )?;
                let row = tx.query_row(
                    "SELECT id, memory_id, job_type, attempts, max_attempts, payload, created_at
                     FROM memory_jobs WHERE id = ?1",
                    params![id],
                    |r| {
                        let job_type: String = r.get(2)?;
                        let payload: Option<String> = r.get(5)?;
                        let created_at: String = r.get(6)?;
                        Ok(LeasedJob {
                            id: r.get(0)?,
                            memory_id: r.get(1)?,
                            job_type: JobType::parse(&job_type).unwrap_or(JobType::Extract),
                            attempts: r.get(3)?,
                            max_attempts: r.get(4)?,
                            payload: payload.and_then(|p| serde_json::from_str(&p).ok()),
                            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                                .map(|d| d.with_timezone(&Utc))
                                .unwrap_or_else(|_| Utc::now()),
                        })
                    },
                )?;
                leased.push(row);
            }
            Ok(leased)
        })
    }

    pub fn complete(&self, job_id: &str, result: Option<serde_json::Value>) -> Result<()> {
        let now = Utc::now();
        self.storage.write(|conn| {
            conn.execute(
                "UPDATE memory_jobs SET status = 'completed', completed_at = ?1, result = ?2 WHERE id = ?3",
                params![now.to_rfc3339(), result.map(|r| r.to_string()), job_id],
            )
        })?;
        Ok(())
    }

    /// Marks a job dead after `max_attempts`, otherwise re-queues it behind
    /// an exponential backoff with jitter (spec.md §4.2).
    ///
    /// There is no dedicated "not-before" column: the backoff is encoded by
    /// setting `leased_at` to `now + backoff - lease_timeout`, so the lease
    /// query's `leased_at < now - lease_timeout` eligibility check also
    /// enforces the backoff delay.
    pub fn fail(&self, job_id: &str, error: &str) -> Result<()> {
        let now = Utc::now();
        self.storage.write_txn(|tx| {
            let (attempts, max_attempts): (i64, i64) = tx.query_row(
                "SELECT attempts, max_attempts FROM memory_jobs WHERE id = ?1",
                params![job_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;

            if attempts >= max_attempts {
                tx.execute(
                    "UPDATE memory_jobs SET status = 'dead', failed_at = ?1, error = ?2 WHERE id = ?3",
                    params![now.to_rfc3339(), error, job_id],
                )?;
            } else {
                let backoff = self.backoff_for_attempt(attempts);
                let lease_timeout = chrono::Duration::from_std(self.config.lease_timeout).unwrap_or_default();
                let not_before_encoded = now + backoff - lease_timeout;
                tx.execute(
                    "UPDATE memory_jobs SET status = 'pending', leased_at = ?1, error = ?2 WHERE id = ?3",
                    params![not_before_encoded.to_rfc3339(), error, job_id],
                )?;
            }
            Ok(())
        })
    }

    fn backoff_for_attempt(&self, attempts: i64) -> chrono::Duration {
        let min = self.config.backoff_min.as_secs_f64();
        let max = self.config.backoff_max.as_secs_f64();
        let exp = min * 2f64.powi((attempts.max(1) - 1) as i32);
        let base = exp.min(max);
        let jitter = rand::thread_rng().gen_range(0.0..=(base * 0.2));
        chrono::Duration::milliseconds(((base + jitter) * 1000.0) as i64)
    }
}

impl JobScheduler for JobQueue {
    fn schedule_extract_embed(&self, memory_id: &str) -> Result<()> {
        self.enqueue(JobType::Extract, memory_id, None)?;
        self.enqueue(JobType::Embed, memory_id, None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;

    fn test_queue() -> JobQueue {
        let storage = Arc::new(Storage::open(None).unwrap());
        JobQueue::new(storage, DaemonConfig::default().jobs)
    }

    #[test]
    fn enqueue_then_lease_marks_processing() {
        let queue = test_queue();
        let job_id = queue.enqueue(JobType::Extract, "mem-1", None).unwrap();
        let leased = queue.lease("worker-a", 10).unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].id, job_id);
        assert_eq!(leased[0].attempts, 1);

        let again = queue.lease("worker-b", 10).unwrap();
        assert!(again.is_empty(), "processing job should not be re-leased before timeout");
    }

    #[test]
    fn fail_requeues_until_max_attempts_then_dead() {
        let queue = test_queue();
        let job_id = queue.enqueue(JobType::Extract, "mem-1", None).unwrap();
        for _ in 0..3 {
            let leased = queue.lease("worker-a", 10).unwrap();
            if leased.is_empty() {
                break;
            }
            queue.fail(&job_id, "boom").unwrap();
        }
        let status: String = queue
            .storage()
            .read(|conn| conn.query_row("SELECT status FROM memory_jobs WHERE id = ?1", params![job_id], |r| r.get(0)))
            .unwrap();
        assert_eq!(status, "dead");
    }

    #[test]
    fn complete_marks_completed_with_result() {
        let queue = test_queue();
        let job_id = queue.enqueue(JobType::Embed, "mem-1", None).unwrap();
        queue.lease("worker-a", 10).unwrap();
        queue.complete(&job_id, Some(serde_json::json!({"ok": true}))).unwrap();
        let status: String = queue
            .storage()
            .read(|conn| conn.query_row("SELECT status FROM memory_jobs WHERE id = ?1", params![job_id], |r| r.get(0)))
            .unwrap();
        assert_eq!(status, "completed");
    }
}
