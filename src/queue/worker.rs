//! Background worker loop

use super::{JobQueue, ProcessOutcome};
use crate::error::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Tally of one reclaim-and-drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerPass {
    pub reclaimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub lease_lost: usize,
}

impl WorkerPass {
    pub fn processed(&self) -> usize {
        self.completed + self.retried + self.failed + self.lease_lost
    }
}

pub struct Worker {
    queue: Arc<JobQueue>,
    notify: Arc<Notify>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        let notify = queue.work_notifier();
        let poll_interval = Duration::from_millis(queue.config().poll_interval_ms.max(1));
        Self {
            queue,
            notify,
            poll_interval,
        }
    }

    /// Reclaim expired leases, then process jobs until none is eligible
    pub async fn run_once(&self) -> Result<WorkerPass> {
        let mut pass = WorkerPass {
            reclaimed: self.queue.reclaim_expired_leases().await?.len(),
            ..WorkerPass::default()
        };

        loop {
            match self.queue.process_next().await? {
                ProcessOutcome::Idle | ProcessOutcome::Busy => break,
                ProcessOutcome::Completed { .. } => pass.completed += 1,
                ProcessOutcome::Retrying { .. } => pass.retried += 1,
                ProcessOutcome::Failed { .. } => pass.failed += 1,
                ProcessOutcome::LeaseLost { .. } => pass.lease_lost += 1,
            }
        }

        if pass.processed() > 0 || pass.reclaimed > 0 {
            info!(
                completed = pass.completed,
                retried = pass.retried,
                failed = pass.failed,
                reclaimed = pass.reclaimed,
                "Worker pass finished"
            );
        }
        Ok(pass)
    }

    /// Run passes until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Worker started");

        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Worker pass failed");
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Worker shutting down");
                    return Ok(());
                }
                _ = self.notify.notified() => debug!("Worker woken by new work"),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
