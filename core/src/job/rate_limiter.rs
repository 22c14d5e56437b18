//! Iteration rate limiting

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Paces iterations to a fixed rate, one permit at a time
///
/// The quota is one cell every `1 / rps` seconds with a burst of one, so
/// fractional rates such as 1.5/s are honoured exactly and a job never
/// starts faster than its configured rate.
///
/// ```
/// use surge_core::job::RequestRateLimiter;
///
/// assert!(RequestRateLimiter::new(Some(1.5)).is_enabled());
/// assert!(!RequestRateLimiter::new(None).is_enabled());
/// assert!(!RequestRateLimiter::new(Some(0.0)).is_enabled());
/// ```
pub struct RequestRateLimiter {
    limiter: Option<DirectLimiter>,
    rps: Option<f64>,
}

impl RequestRateLimiter {
    /// Build a limiter for `rps` iterations per second
    ///
    /// `None`, zero, negative and non-finite rates disable limiting.
    pub fn new(rps: Option<f64>) -> Self {
        let rps = rps.filter(|rps| rps.is_finite() && *rps > 0.0);
        let limiter = rps.and_then(|rps| {
            let period = Duration::from_secs_f64(1.0 / rps).max(Duration::from_nanos(1));
            Quota::with_period(period)
                .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)))
        });

        Self { limiter, rps }
    }

    /// Wait for the next permit; returns at once when limiting is off
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Whether a rate is being enforced
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}

impl std::fmt::Debug for RequestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRateLimiter")
            .field("rps", &self.rps)
            .finish()
    }
}
