//! Backoff controller used to pace retries after failed sends
//!
//! The controller is pure state: it never sleeps and never fails. The job loop
//! asks it for a timeout after each failure and resets it after each success.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff parameters
///
/// Durations are written in humantime form in configuration files
/// (`"100ms"`, `"3s"`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Wait after the first failure, and the baseline after a reset
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,

    /// Upper bound for any wait
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor applied per consecutive failure
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Create a config with explicit bounds and growth factor
    pub fn new(min_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            min_delay,
            max_delay,
            multiplier,
        }
    }

    /// Pick the job-level override when present, otherwise the global default
    pub fn resolve(job: Option<&BackoffConfig>, global: &BackoffConfig) -> BackoffConfig {
        job.copied().unwrap_or(*global)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), BackoffConfigError> {
        if self.min_delay.is_zero() {
            return Err(BackoffConfigError::ZeroMinDelay);
        }
        if self.max_delay < self.min_delay {
            return Err(BackoffConfigError::MaxBelowMin {
                min: self.min_delay,
                max: self.max_delay,
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(BackoffConfigError::InvalidMultiplier(self.multiplier));
        }
        Ok(())
    }
}

/// Backoff configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackoffConfigError {
    /// Minimum delay of zero would turn backoff into a busy loop
    #[error("min_delay must be greater than zero")]
    ZeroMinDelay,

    /// Maximum delay lower than the minimum
    #[error("max_delay {max:?} is lower than min_delay {min:?}")]
    MaxBelowMin {
        /// Configured minimum
        min: Duration,
        /// Configured maximum
        max: Duration,
    },

    /// Multiplier below 1.0 or not a number
    #[error("multiplier must be a finite number >= 1.0, got {0}")]
    InvalidMultiplier(f64),
}

/// Tracks consecutive failures and the wait before the next attempt
#[derive(Debug, Clone)]
pub struct BackoffController {
    config: BackoffConfig,
    current: Option<Duration>,
    failures: u32,
}

impl BackoffController {
    /// Create a controller at the baseline wait
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: None,
            failures: 0,
        }
    }

    /// Record a failure and grow the wait, bounded by `max_delay`
    ///
    /// Returns `self` so the caller can read the new timeout in one expression.
    pub fn increment(&mut self) -> &mut Self {
        let next = match self.current {
            None => self.config.min_delay,
            Some(current) => grow(current, self.config.multiplier, self.config.max_delay),
        };
        self.current = Some(next.min(self.config.max_delay));
        self.failures = self.failures.saturating_add(1);
        self
    }

    /// Return to the baseline wait
    pub fn reset(&mut self) {
        self.current = None;
        self.failures = 0;
    }

    /// Current wait before the next attempt
    pub fn timeout(&self) -> Duration {
        self.current.unwrap_or(self.config.min_delay)
    }

    /// Number of consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

// Integer nanosecond arithmetic keeps 100ms * 2 at exactly 200ms.
fn grow(current: Duration, multiplier: f64, cap: Duration) -> Duration {
    let nanos = current.as_nanos() as f64 * multiplier;
    if !nanos.is_finite() || nanos >= cap.as_nanos() as f64 {
        return cap;
    }
    Duration::from_nanos(nanos.max(0.0).round() as u64)
}
