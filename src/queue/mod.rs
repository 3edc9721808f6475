//! Processing queue manager
//!
//! Owns the job state machine on top of the `processing_queue` table:
//!
//! ```text
//! pending → processing → completed
//!              │  └────→ failed ──(manual retry)──→ pending
//!              └───────→ pending (retriable failure or expired lease)
//! ```
//!
//! Claims are atomic in the database, so several workers (even in different
//! processes) never run the same job. Within one `JobQueue` an in-memory
//! single-flight flag additionally keeps at most one job in flight.

mod backoff;
mod hooks;
mod worker;

pub use backoff::*;
pub use hooks::*;
pub use worker::*;

use crate::config::QueueConfig;
use crate::error::{IngestError, Result};
use crate::ingest::{IngestSuccess, IngestionPipeline};
use crate::meta::{
    ClaimedJob, EnqueuedJob, JobStatus, MaterialStatus, MetaDb, NewMaterial, QueueCounts, QueueJob,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// What a single `process_next` call did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// No job was eligible
    Idle,
    /// Another job is already in flight on this queue
    Busy,
    Completed {
        job_id: String,
        material_id: String,
        chunks_created: usize,
    },
    Retrying {
        job_id: String,
        material_id: String,
        attempts: i64,
        next_attempt_at: DateTime<Utc>,
        error: String,
    },
    Failed {
        job_id: String,
        material_id: String,
        attempts: i64,
        error: String,
    },
    /// The lease expired and the job was reclaimed while we were running it
    LeaseLost { job_id: String, material_id: String },
}

/// Client-facing processing status of one material
#[derive(Debug, Clone, Serialize)]
pub struct MaterialStatusReport {
    pub material_id: String,
    pub processing_status: MaterialStatus,
    pub processing_error: Option<String>,
    pub chunks_count: i64,
    pub processed: bool,
    pub queue_job: Option<QueueJob>,
}

/// Clears the single-flight flag when processing ends, even on error
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct JobQueue {
    db: MetaDb,
    pipeline: IngestionPipeline,
    invalidator: Arc<dyn CacheInvalidator>,
    config: QueueConfig,
    backoff: BackoffPolicy,
    in_flight: AtomicBool,
    work_available: Arc<Notify>,
}

impl JobQueue {
    pub fn new(
        db: MetaDb,
        pipeline: IngestionPipeline,
        invalidator: Arc<dyn CacheInvalidator>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            db,
            pipeline,
            invalidator,
            config: config.clone(),
            backoff: BackoffPolicy::from_config(config),
            in_flight: AtomicBool::new(false),
            work_available: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Signalled whenever new work is enqueued or requeued
    pub fn work_notifier(&self) -> Arc<Notify> {
        self.work_available.clone()
    }

    /// Enqueue a material. Idempotent per material id.
    pub async fn add_job(&self, material: &NewMaterial) -> Result<EnqueuedJob> {
        let enqueued = self
            .db
            .enqueue_job(material, self.config.max_attempts, Utc::now())
            .await?;

        if enqueued.created {
            info!(job_id = %enqueued.job.id, material_id = %material.id, "Job enqueued");
            self.status_changed(&material.id, MaterialStatus::Queued)
                .await;
            self.work_available.notify_one();
        } else {
            debug!(
                job_id = %enqueued.job.id,
                material_id = %material.id,
                status = %enqueued.job.status,
                "Job already exists"
            );
        }
        Ok(enqueued)
    }

    /// Claim and run the oldest eligible job
    pub async fn process_next(&self) -> Result<ProcessOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(ProcessOutcome::Busy);
        }
        let _in_flight = InFlight(&self.in_flight);

        let now = Utc::now();
        let Some(claimed) = self.db.claim_next_job(now, now + self.lease()).await? else {
            return Ok(ProcessOutcome::Idle);
        };

        let job_id = claimed.job.id.clone();
        let material_id = claimed.material.id.clone();
        info!(
            job_id = %job_id,
            material_id = %material_id,
            attempt = claimed.job.attempts + 1,
            "Processing job"
        );
        self.status_changed(&material_id, MaterialStatus::Processing)
            .await;

        match self.run_with_heartbeat(&claimed).await {
            Some(Ok(success)) => self.finish_success(&claimed, success).await,
            Some(Err(err)) => self.finish_failure(&claimed, err).await,
            None => {
                warn!(job_id = %job_id, material_id = %material_id, "Lease lost, abandoning job");
                Ok(ProcessOutcome::LeaseLost {
                    job_id,
                    material_id,
                })
            }
        }
    }

    /// Run the pipeline while renewing the lease every heartbeat.
    ///
    /// `None` once a renewal finds the claim gone; the pipeline is dropped
    /// mid-flight and nothing more is written for this claim.
    async fn run_with_heartbeat(
        &self,
        claimed: &ClaimedJob,
    ) -> Option<std::result::Result<IngestSuccess, IngestError>> {
        let ingest = self.pipeline.ingest_claimed(claimed);
        tokio::pin!(ingest);

        let period = Duration::from_secs(self.config.heartbeat_secs.max(1));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                result = &mut ingest => return Some(result),
                _ = heartbeat.tick() => {
                    let now = Utc::now();
                    match self
                        .db
                        .renew_lease(&claimed.job.id, &claimed.token, now + self.lease(), now)
                        .await
                    {
                        Ok(true) => debug!(job_id = %claimed.job.id, "Lease renewed"),
                        Ok(false) => return None,
                        Err(e) => warn!(job_id = %claimed.job.id, error = %e, "Lease renewal failed"),
                    }
                }
            }
        }
    }

    async fn finish_success(
        &self,
        claimed: &ClaimedJob,
        success: IngestSuccess,
    ) -> Result<ProcessOutcome> {
        let job_id = claimed.job.id.clone();
        let material_id = claimed.material.id.clone();

        let Some(job) = self
            .db
            .complete_job(&job_id, &claimed.token, success.chunks_created, Utc::now())
            .await?
        else {
            warn!(job_id = %job_id, "Job was reclaimed before it completed");
            return Ok(ProcessOutcome::LeaseLost {
                job_id,
                material_id,
            });
        };

        info!(
            job_id = %job.id,
            material_id = %material_id,
            chunks = success.chunks_created,
            attempts = job.attempts,
            "Job completed"
        );
        self.status_changed(&material_id, MaterialStatus::Completed)
            .await;

        Ok(ProcessOutcome::Completed {
            job_id,
            material_id,
            chunks_created: success.chunks_created,
        })
    }

    async fn finish_failure(&self, claimed: &ClaimedJob, err: IngestError) -> Result<ProcessOutcome> {
        let job_id = claimed.job.id.clone();
        let material_id = claimed.material.id.clone();
        let message = err.to_string();

        let attempts = u32::try_from(claimed.job.attempts + 1).unwrap_or(u32::MAX);
        let delay = self.backoff.delay_for(err.kind(), attempts);
        let now = Utc::now();
        let next_attempt_at = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        let Some(job) = self
            .db
            .fail_job(&job_id, &claimed.token, &message, next_attempt_at, now)
            .await?
        else {
            warn!(job_id = %job_id, error = %message, "Job was reclaimed before it failed");
            return Ok(ProcessOutcome::LeaseLost {
                job_id,
                material_id,
            });
        };

        if job.status()? == JobStatus::Failed {
            error!(
                job_id = %job_id,
                material_id = %material_id,
                attempts = job.attempts,
                error = %message,
                "Job failed permanently"
            );
            self.status_changed(&material_id, MaterialStatus::Failed)
                .await;
            Ok(ProcessOutcome::Failed {
                job_id,
                material_id,
                attempts: job.attempts,
                error: message,
            })
        } else {
            warn!(
                job_id = %job_id,
                material_id = %material_id,
                attempts = job.attempts,
                delay_secs = delay.as_secs(),
                error = %message,
                "Job failed, will retry"
            );
            self.status_changed(&material_id, MaterialStatus::Queued)
                .await;
            Ok(ProcessOutcome::Retrying {
                job_id,
                material_id,
                attempts: job.attempts,
                next_attempt_at,
                error: message,
            })
        }
    }

    /// Requeue failed jobs that still have attempts left
    pub async fn retry_failed(&self) -> Result<Vec<QueueJob>> {
        let jobs = self.db.retry_failed_jobs(Utc::now()).await?;
        for job in &jobs {
            self.status_changed(&job.material_id, MaterialStatus::Queued)
                .await;
        }
        if !jobs.is_empty() {
            info!(count = jobs.len(), "Requeued failed jobs");
            self.work_available.notify_one();
        }
        Ok(jobs)
    }

    /// Requeue one failed job, optionally granting a fresh set of attempts
    pub async fn retry_job(&self, job_id: &str, reset_attempts: bool) -> Result<QueueJob> {
        let job = self.db.retry_job(job_id, reset_attempts, Utc::now()).await?;
        info!(job_id = %job.id, reset_attempts, "Job requeued");
        self.status_changed(&job.material_id, MaterialStatus::Queued)
            .await;
        self.work_available.notify_one();
        Ok(job)
    }

    /// Return jobs with expired leases to the queue
    pub async fn reclaim_expired_leases(&self) -> Result<Vec<QueueJob>> {
        let jobs = self.db.reclaim_expired_leases(Utc::now()).await?;
        for job in &jobs {
            let status = job.status()?.material_status();
            warn!(job_id = %job.id, material_id = %job.material_id, status = %job.status, "Reclaimed expired lease");
            self.status_changed(&job.material_id, status).await;
        }
        Ok(jobs)
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<Option<QueueJob>> {
        self.db.get_job(job_id).await
    }

    pub async fn get_job_status_by_material_id(&self, material_id: &str) -> Result<Option<QueueJob>> {
        self.db.get_job_by_material(material_id).await
    }

    /// Status view polled by clients; `None` for unknown materials
    pub async fn get_material_status(&self, material_id: &str) -> Result<Option<MaterialStatusReport>> {
        let Some(material) = self.db.get_material(material_id).await? else {
            return Ok(None);
        };
        let queue_job = self.db.get_job_by_material(material_id).await?;

        Ok(Some(MaterialStatusReport {
            processing_status: material.status()?,
            material_id: material.id,
            processing_error: material.processing_error,
            chunks_count: material.chunks_count,
            processed: material.processed,
            queue_job,
        }))
    }

    pub async fn get_queue_stats(&self) -> Result<QueueCounts> {
        self.db.queue_counts().await
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<QueueJob>> {
        self.db.list_jobs(status, limit).await
    }

    fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.lease_secs as i64)
    }

    async fn status_changed(&self, material_id: &str, status: MaterialStatus) {
        self.invalidator
            .material_status_changed(material_id, status)
            .await;
    }
}
