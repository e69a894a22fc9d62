use std::num::NonZeroU32;
use std::time::Duration;

use gn_core::{Error, Result};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter as GovernorRateLimiter};

/// Token bucket shared by all requests of one client. The bucket starts full,
/// so the first `max_burst` requests go out immediately.
pub struct RateLimiter {
    limiter: GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    requests_per_second: f64,
    max_burst: u32,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, max_burst: u32) -> Result<Self> {
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(Error::Config(format!(
                "requests per second must be positive, got {requests_per_second}"
            )));
        }
        let burst = NonZeroU32::new(max_burst)
            .ok_or_else(|| Error::Config("rate limiter burst must be greater than zero".to_string()))?;
        let period = Duration::from_secs_f64(1.0 / requests_per_second);
        let quota = Quota::with_period(period)
            .ok_or_else(|| Error::Config("rate limiter period must be non-zero".to_string()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: GovernorRateLimiter::direct(quota),
            requests_per_second,
            max_burst,
        })
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a token without waiting; `false` if the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_second", &self.requests_per_second)
            .field("max_burst", &self.max_burst)
            .finish()
    }
}
