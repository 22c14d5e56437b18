//! Iteration gate: decides whether the job loop may run another iteration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::rate_limiter::RequestRateLimiter;
use super::sleep;

/// Iteration budget and pacing for a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Maximum number of iterations, 0 for unlimited
    pub count: u64,

    /// Fixed pause between iterations
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Iterations per second, unlimited when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,
}

impl GateConfig {
    /// Limit the number of iterations
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Pause between iterations
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Limit iterations per second
    pub fn with_rate_limit(mut self, rps: f64) -> Self {
        self.rate_limit = Some(rps);
        self
    }
}

/// Stateful gate built from a [`GateConfig`]
#[derive(Debug)]
pub struct IterationGate {
    count: Option<u64>,
    interval: Duration,
    rate_limiter: RequestRateLimiter,
    issued: u64,
}

impl IterationGate {
    /// Create a gate
    pub fn new(config: &GateConfig) -> Self {
        Self {
            count: (config.count > 0).then_some(config.count),
            interval: config.interval,
            rate_limiter: RequestRateLimiter::new(config.rate_limit),
            issued: 0,
        }
    }

    /// Wait for permission to run the next iteration
    ///
    /// Returns `false` once the token is cancelled or the budget is spent.
    /// Both the interval pause and the rate limiter wait give way to
    /// cancellation.
    pub async fn next(&mut self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if self.count.is_some_and(|count| self.issued >= count) {
            return false;
        }
        if self.issued > 0 && !self.interval.is_zero() && !sleep(self.interval, cancel).await {
            return false;
        }

        if self.rate_limiter.is_enabled() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return false,

                _ = self.rate_limiter.wait() => {}
            }
        }

        self.issued += 1;
        true
    }

    /// Iterations granted so far
    pub fn issued(&self) -> u64 {
        self.issued
    }
}
