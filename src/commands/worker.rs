//! Enqueue and worker commands

use crate::error::{Error, Result};
use crate::meta::{EnqueuedJob, NewMaterial};
use crate::queue::{JobQueue, Worker, WorkerPass};
use std::sync::Arc;
use tracing::info;

/// Queue a material for ingestion
pub async fn cmd_enqueue(queue: &JobQueue, material: NewMaterial) -> Result<EnqueuedJob> {
    if material.id.trim().is_empty() || material.course_id.trim().is_empty() {
        return Err(Error::Other(
            "material id and course id must not be empty".to_string(),
        ));
    }
    url::Url::parse(&material.file_url)?;

    queue.add_job(&material).await
}

pub fn print_enqueued(enqueued: &EnqueuedJob) {
    if enqueued.created {
        println!("✓ Queued material '{}'", enqueued.job.material_id);
    } else {
        println!(
            "Material '{}' already has a job (status: {})",
            enqueued.job.material_id, enqueued.job.status
        );
    }
    println!("  Job: {}", enqueued.job.id);
}

/// Run the worker. With `once`, drain the queue and return the tally.
pub async fn cmd_worker(queue: Arc<JobQueue>, once: bool) -> Result<Option<WorkerPass>> {
    let worker = Worker::new(queue);

    if once {
        return worker.run_once().await.map(Some);
    }

    info!("Worker running; press Ctrl-C to stop");
    worker
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;
    Ok(None)
}

pub fn print_worker_pass(pass: &WorkerPass) {
    println!("\n✓ Worker pass complete");
    println!("  Reclaimed leases: {}", pass.reclaimed);
    println!("  Completed: {}", pass.completed);
    println!("  Scheduled for retry: {}", pass.retried);
    println!("  Failed: {}", pass.failed);
    if pass.lease_lost > 0 {
        println!("  Lost leases: {}", pass.lease_lost);
    }
}
