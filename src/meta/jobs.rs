//! Processing queue persistence
//!
//! Every job transition updates the owning material in the same transaction,
//! so `materials.processing_status` always follows the last job status.

use super::{format_ts, Material, MaterialStatus, MetaDb, NewMaterial};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, Transaction};
use std::str::FromStr;
use uuid::Uuid;

/// Queue job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(Error::Other(format!("Unknown job status: {}", s))),
        }
    }
}

impl JobStatus {
    /// Material status mirrored for this job status
    pub fn material_status(self) -> MaterialStatus {
        match self {
            JobStatus::Pending => MaterialStatus::Queued,
            JobStatus::Processing => MaterialStatus::Processing,
            JobStatus::Completed => MaterialStatus::Completed,
            JobStatus::Failed => MaterialStatus::Failed,
        }
    }
}

/// A processing queue job
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: String,
    pub material_id: String,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub error: Option<String>,
    pub next_attempt_at: String,
    pub lease_expires_at: Option<String>,
    /// Set on claim; only the holder of the current token may renew or finish
    #[serde(skip)]
    pub claim_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl QueueJob {
    pub fn status(&self) -> Result<JobStatus> {
        self.status.parse()
    }
}

/// A job claimed for processing together with its material
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: QueueJob,
    pub material: Material,
    /// Fencing token of this claim; a later claim of the same job gets a new one
    pub token: String,
}

/// Result of an enqueue call
#[derive(Debug, Clone)]
pub struct EnqueuedJob {
    pub job: QueueJob,
    /// False when a job already existed for the material
    pub created: bool,
}

/// Job counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

const LEASE_EXPIRED: &str = "lease expired";

impl MetaDb {
    // ===== Queue Job Operations =====

    /// Create the job for a material unless one exists (in any state)
    pub async fn enqueue_job(
        &self,
        material: &NewMaterial,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<EnqueuedJob> {
        let now = format_ts(now);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO materials (id, title, file_url, course_id, processing_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&material.id)
        .bind(&material.title)
        .bind(&material.file_url)
        .bind(&material.course_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO processing_queue (id, material_id, status, attempts, max_attempts, next_attempt_at, created_at, updated_at)
            VALUES (?, ?, 'pending', 0, ?, ?, ?, ?)
            ON CONFLICT(material_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&material.id)
        .bind(i64::from(max_attempts))
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let created = inserted.rows_affected() == 1;

        if created {
            set_material_status(&mut tx, &material.id, MaterialStatus::Queued, None, &now)
                .await?;
        }

        let job = sqlx::query_as::<_, QueueJob>(
            "SELECT * FROM processing_queue WHERE material_id = ?",
        )
        .bind(&material.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(EnqueuedJob { job, created })
    }

    /// Atomically claim the oldest eligible pending job
    pub async fn claim_next_job(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<ClaimedJob>> {
        let now = format_ts(now);
        let token = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, QueueJob>(
            r#"
            UPDATE processing_queue
            SET status = 'processing', started_at = ?, updated_at = ?, lease_expires_at = ?,
                claim_token = ?
            WHERE id = (
                SELECT id FROM processing_queue
                WHERE status = 'pending' AND next_attempt_at <= ?
                ORDER BY created_at, rowid
                LIMIT 1
            ) AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(format_ts(lease_until))
        .bind(&token)
        .bind(&now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE materials
            SET processing_status = 'processing', processing_started_at = ?,
                processing_completed_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(&job.material_id)
        .execute(&mut *tx)
        .await?;

        let material = sqlx::query_as::<_, Material>("SELECT * FROM materials WHERE id = ?")
            .bind(&job.material_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(ClaimedJob {
            job,
            material,
            token,
        }))
    }

    /// Extend the lease of a job still held under `token`.
    ///
    /// `false` means the job was reclaimed (and possibly claimed again) since.
    pub async fn renew_lease(
        &self,
        job_id: &str,
        token: &str,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processing_queue SET lease_expires_at = ?, updated_at = ?
            WHERE id = ? AND claim_token = ? AND status = 'processing'
            "#,
        )
        .bind(format_ts(lease_until))
        .bind(format_ts(now))
        .bind(job_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a processing job completed. `None` if the job was no longer ours.
    pub async fn complete_job(
        &self,
        job_id: &str,
        token: &str,
        chunks_count: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueJob>> {
        let now = format_ts(now);
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, QueueJob>(
            r#"
            UPDATE processing_queue
            SET status = 'completed', attempts = attempts + 1, error = NULL,
                lease_expires_at = NULL, claim_token = NULL, completed_at = ?, updated_at = ?
            WHERE id = ? AND claim_token = ? AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(job_id)
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE materials
            SET processing_status = 'completed', processed = 1, chunks_count = ?,
                processing_error = NULL, processing_completed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(chunks_count as i64)
        .bind(&now)
        .bind(&now)
        .bind(&job.material_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(job))
    }

    /// Record a failed attempt.
    ///
    /// The job returns to `pending` (eligible from `next_attempt_at`) while
    /// attempts remain, otherwise it becomes `failed`.
    pub async fn fail_job(
        &self,
        job_id: &str,
        token: &str,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueJob>> {
        let now = format_ts(now);
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, QueueJob>(
            r#"
            UPDATE processing_queue
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
                error = ?, lease_expires_at = NULL, claim_token = NULL, next_attempt_at = ?,
                updated_at = ?
            WHERE id = ? AND claim_token = ? AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(error)
        .bind(format_ts(next_attempt_at))
        .bind(&now)
        .bind(job_id)
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(job) = &job {
            sync_material_after_failure(&mut tx, job, &now).await?;
        }

        tx.commit().await?;
        Ok(job)
    }

    /// Return `processing` jobs whose lease ran out to the queue.
    ///
    /// The lost run counts as an attempt.
    pub async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> Result<Vec<QueueJob>> {
        let now = format_ts(now);
        let mut tx = self.pool.begin().await?;

        let jobs = sqlx::query_as::<_, QueueJob>(
            r#"
            UPDATE processing_queue
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
                error = ?, lease_expires_at = NULL, claim_token = NULL, next_attempt_at = ?,
                updated_at = ?
            WHERE status = 'processing'
              AND lease_expires_at IS NOT NULL
              AND lease_expires_at <= ?
            RETURNING *
            "#,
        )
        .bind(LEASE_EXPIRED)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_all(&mut *tx)
        .await?;

        for job in &jobs {
            sync_material_after_failure(&mut tx, job, &now).await?;
        }

        tx.commit().await?;
        Ok(jobs)
    }

    /// Requeue failed jobs that still have attempts left
    pub async fn retry_failed_jobs(&self, now: DateTime<Utc>) -> Result<Vec<QueueJob>> {
        let now = format_ts(now);
        let mut tx = self.pool.begin().await?;

        let jobs = sqlx::query_as::<_, QueueJob>(
            r#"
            UPDATE processing_queue
            SET status = 'pending', error = NULL, next_attempt_at = ?, updated_at = ?
            WHERE status = 'failed' AND attempts < max_attempts
            RETURNING *
            "#,
        )
        .bind(&now)
        .bind(&now)
        .fetch_all(&mut *tx)
        .await?;

        for job in &jobs {
            set_material_status(&mut tx, &job.material_id, MaterialStatus::Queued, None, &now)
                .await?;
        }

        tx.commit().await?;
        Ok(jobs)
    }

    /// Force-requeue one failed job, optionally resetting its attempt counter
    pub async fn retry_job(
        &self,
        job_id: &str,
        reset_attempts: bool,
        now: DateTime<Utc>,
    ) -> Result<QueueJob> {
        let now = format_ts(now);
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, QueueJob>(
            r#"
            UPDATE processing_queue
            SET status = 'pending', error = NULL, next_attempt_at = ?, updated_at = ?,
                attempts = CASE WHEN ? THEN 0 ELSE attempts END
            WHERE id = ? AND status = 'failed' AND (? OR attempts < max_attempts)
            RETURNING *
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(reset_attempts)
        .bind(job_id)
        .bind(reset_attempts)
        .fetch_optional(&mut *tx)
        .await?;

        match job {
            Some(job) => {
                set_material_status(&mut tx, &job.material_id, MaterialStatus::Queued, None, &now)
                    .await?;
                tx.commit().await?;
                Ok(job)
            }
            None => {
                tx.rollback().await?;
                let existing = self
                    .get_job(job_id)
                    .await?
                    .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
                if existing.status()? != JobStatus::Failed {
                    return Err(Error::InvalidTransition {
                        job_id: job_id.to_string(),
                        from: existing.status,
                        to: JobStatus::Pending.to_string(),
                    });
                }
                Err(Error::AttemptsExhausted(job_id.to_string()))
            }
        }
    }

    /// Get job by ID
    pub async fn get_job(&self, id: &str) -> Result<Option<QueueJob>> {
        let job = sqlx::query_as::<_, QueueJob>("SELECT * FROM processing_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Get the job for a material
    pub async fn get_job_by_material(&self, material_id: &str) -> Result<Option<QueueJob>> {
        let job = sqlx::query_as::<_, QueueJob>(
            "SELECT * FROM processing_queue WHERE material_id = ?",
        )
        .bind(material_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    /// List jobs, most recently updated first
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<QueueJob>> {
        let status = status.map(|s| s.to_string());
        let jobs = sqlx::query_as::<_, QueueJob>(
            r#"
            SELECT * FROM processing_queue
            WHERE (? IS NULL OR status = ?)
            ORDER BY updated_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(&status)
        .bind(&status)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// Job counts per status
    pub async fn queue_counts(&self) -> Result<QueueCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM processing_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status.parse::<JobStatus>()? {
                JobStatus::Pending => counts.pending = count,
                JobStatus::Processing => counts.processing = count,
                JobStatus::Completed => counts.completed = count,
                JobStatus::Failed => counts.failed = count,
            }
            counts.total += count;
        }
        Ok(counts)
    }
}

async fn set_material_status(
    tx: &mut Transaction<'_, Sqlite>,
    material_id: &str,
    status: MaterialStatus,
    error: Option<&str>,
    now: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE materials SET processing_status = ?, processing_error = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status.to_string())
    .bind(error)
    .bind(now)
    .bind(material_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn sync_material_after_failure(
    tx: &mut Transaction<'_, Sqlite>,
    job: &QueueJob,
    now: &str,
) -> Result<()> {
    let status = job.status()?.material_status();
    set_material_status(tx, &job.material_id, status, job.error.as_deref(), now).await
}
