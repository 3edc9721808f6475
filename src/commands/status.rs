//! Material status and queue inspection commands

use crate::error::{Error, Result};
use crate::meta::{JobStatus, QueueCounts, QueueJob};
use crate::queue::{JobQueue, MaterialStatusReport};
use tracing::info;

/// Status report for one material, failing when it is unknown
pub async fn cmd_material_status(queue: &JobQueue, material_id: &str) -> Result<MaterialStatusReport> {
    queue
        .get_material_status(material_id)
        .await?
        .ok_or_else(|| Error::MaterialNotFound(material_id.to_string()))
}

pub async fn cmd_job(queue: &JobQueue, job_id: &str) -> Result<QueueJob> {
    queue
        .get_job_status(job_id)
        .await?
        .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
}

/// List jobs, optionally filtered by a status name
pub async fn cmd_jobs(queue: &JobQueue, status: Option<&str>, limit: u32) -> Result<Vec<QueueJob>> {
    let status = status.map(str::parse::<JobStatus>).transpose()?;
    info!(?status, limit, "Listing jobs");
    queue.list_jobs(status, limit).await
}

/// Print a material status report to console
pub fn print_material_status(report: &MaterialStatusReport) {
    println!("\n📄 Material {}\n", report.material_id);
    println!("  Status: {}", report.processing_status);
    println!("  Processed: {}", if report.processed { "yes" } else { "no" });
    println!("  Chunks: {}", report.chunks_count);
    if let Some(error) = &report.processing_error {
        println!("  Error: {}", error);
    }
    if let Some(job) = &report.queue_job {
        println!("\nQueue job:");
        print_job_fields(job);
    }
}

pub fn print_job(job: &QueueJob) {
    println!("\n🧾 Job {}\n", job.id);
    print_job_fields(job);
}

fn print_job_fields(job: &QueueJob) {
    println!("  ID: {}", job.id);
    println!("  Material: {}", job.material_id);
    println!("  Status: {}", job.status);
    println!("  Attempts: {}/{}", job.attempts, job.max_attempts);
    println!("  Next attempt: {}", job.next_attempt_at);
    if let Some(lease) = &job.lease_expires_at {
        println!("  Lease expires: {}", lease);
    }
    if let Some(error) = &job.error {
        println!("  Last error: {}", error);
    }
    println!("  Updated: {}", job.updated_at);
}

pub fn print_jobs(jobs: &[QueueJob]) {
    if jobs.is_empty() {
        println!("No jobs found.");
        return;
    }

    println!(
        "{:<36}  {:<20}  {:<10}  {:>8}  {}",
        "JOB", "MATERIAL", "STATUS", "ATTEMPTS", "LAST ERROR"
    );
    for job in jobs {
        println!(
            "{:<36}  {:<20}  {:<10}  {:>8}  {}",
            job.id,
            job.material_id,
            job.status,
            format!("{}/{}", job.attempts, job.max_attempts),
            job.error.as_deref().unwrap_or("-")
        );
    }
}

pub fn print_queue_stats(counts: &QueueCounts) {
    println!("\n📊 Queue\n");
    println!("  Pending: {}", counts.pending);
    println!("  Processing: {}", counts.processing);
    println!("  Completed: {}", counts.completed);
    println!("  Failed: {}", counts.failed);
    println!("  Total: {}", counts.total);
}

/// Print the jobs touched by a bulk queue action
pub fn print_requeued(action: &str, jobs: &[QueueJob]) {
    println!("✓ {} {} job(s)", action, jobs.len());
    for job in jobs {
        println!("  {} ({}) -> {}", job.id, job.material_id, job.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobQueue, NoopInvalidator};
    use crate::test_support::{new_material, pipeline, test_config, test_db, FakeFetcher, FakeProvider};
    use std::sync::Arc;

    async fn queue() -> (JobQueue, tempfile::TempDir) {
        let (db, tmp) = test_db().await;
        let config = test_config(&tmp);
        let pipeline = pipeline(
            &db,
            &config,
            Arc::new(FakeFetcher::new()),
            Arc::new(FakeProvider::new(4)),
        );
        let queue = JobQueue::new(db, pipeline, Arc::new(NoopInvalidator), &config.queue);
        (queue, tmp)
    }

    #[tokio::test]
    async fn test_lookups_fail_for_unknown_ids() {
        let (queue, _tmp) = queue().await;
        assert!(matches!(
            cmd_material_status(&queue, "missing").await,
            Err(Error::MaterialNotFound(_))
        ));
        assert!(matches!(
            cmd_job(&queue, "missing").await,
            Err(Error::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_jobs_filter_by_status_name() {
        let (queue, _tmp) = queue().await;
        let enqueued = queue.add_job(&new_material("m1", "c1")).await.unwrap();

        let pending = cmd_jobs(&queue, Some("pending"), 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, enqueued.job.id);

        assert!(cmd_jobs(&queue, Some("failed"), 10).await.unwrap().is_empty());
        assert!(cmd_jobs(&queue, Some("sideways"), 10).await.is_err());

        let report = cmd_material_status(&queue, "m1").await.unwrap();
        assert_eq!(report.queue_job.unwrap().id, enqueued.job.id);
    }
}
