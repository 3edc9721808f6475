//! Client-side pacing for provider requests

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use tracing::trace;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Process-wide limiter shared by embedding and chat requests
pub struct ProviderRateLimiter {
    limiter: DirectLimiter,
}

impl ProviderRateLimiter {
    /// `None` when pacing is disabled (0 requests per second)
    pub fn from_config(requests_per_second: u32) -> Option<Self> {
        NonZeroU32::new(requests_per_second).map(Self::new)
    }

    pub fn new(requests_per_second: NonZeroU32) -> Self {
        let quota = Quota::per_second(requests_per_second).allow_burst(nonzero!(1u32));
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Wait until a request is allowed
    pub async fn wait(&self) {
        trace!("Waiting for provider rate limiter");
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_disabled_when_zero() {
        assert!(ProviderRateLimiter::from_config(0).is_none());
        assert!(ProviderRateLimiter::from_config(5).is_some());
    }

    #[tokio::test]
    async fn test_rate_limiter_paces_requests() {
        let limiter = ProviderRateLimiter::new(nonzero!(10u32)); // 100ms apart

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;

        // Should take at least 200ms for 3 requests (2 intervals)
        assert!(start.elapsed() >= Duration::from_millis(180));
    }
}
