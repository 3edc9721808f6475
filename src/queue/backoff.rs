//! Retry delay selection by failure kind

use crate::config::QueueConfig;
use crate::error::FailureKind;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_secs: u64,
    max_secs: u64,
}

impl BackoffPolicy {
    pub fn new(base_secs: u64, max_secs: u64) -> Self {
        Self {
            base_secs,
            max_secs,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.backoff_base_secs, config.backoff_max_secs)
    }

    /// Delay before a job may run again. `attempts` counts the failed run.
    ///
    /// Rate limits wait exactly what the provider asked for; timeouts and
    /// provider errors back off exponentially; fetch, parse and persistence
    /// failures are eligible immediately.
    pub fn delay_for(&self, kind: FailureKind, attempts: u32) -> Duration {
        match kind {
            FailureKind::RateLimited { retry_after_secs } => Duration::from_secs(retry_after_secs),
            FailureKind::Timeout | FailureKind::ProviderApi => {
                let exponent = attempts.saturating_sub(1).min(32);
                let secs = self
                    .base_secs
                    .saturating_mul(1u64 << exponent)
                    .min(self.max_secs);
                Duration::from_secs(secs)
            }
            FailureKind::Fetch | FailureKind::Parse | FailureKind::Persistence => Duration::ZERO,
        }
    }
}
