//! Job module: the continuous request loop and its single-shot variant
//!
//! A [`Job`] runs one configured request template in a loop:
//! **gate -> materialize -> meter -> send -> account -> pace -> repeat**.
//!
//! 1. The [`IterationGate`] decides whether another iteration may run
//!    (iteration budget, fixed interval, rate limit, cancellation)
//! 2. The request template is evaluated into a fresh descriptor
//! 3. Its size goes to the attempted-traffic stream before the send
//! 4. The transport executes the exchange
//! 5. On success the size goes to the delivered-traffic stream and the
//!    backoff resets; on failure the backoff grows and the loop sleeps
//!
//! Transient send failures never end the loop. Only template failures do,
//! and they come back as [`JobError::Template`](crate::JobError::Template).
//!
//! # Example
//!
//! ```ignore
//! use surge_core::job::{GateConfig, JobBuilder};
//!
//! let job = JobBuilder::new("pinger")
//!     .template(Arc::new(RequestTemplate::parse(&request)?))
//!     .transport(transport)
//!     .metrics(metrics)
//!     .gate(GateConfig::default().with_count(100))
//!     .build()?;
//!
//! let stats = job.run(cancel.clone()).await?;
//! println!("Delivered {} bytes", stats.delivered_bytes);
//! ```

mod builder;
mod executor;
mod gate;
mod rate_limiter;
mod single;
mod stats;

pub use builder::JobBuilder;
pub use executor::Job;
pub use gate::{GateConfig, IterationGate};
pub use rate_limiter::RequestRateLimiter;
pub use single::SingleShotOutcome;
pub use stats::JobStats;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `cancel` fires first
///
/// Returns `false` when the sleep was cut short by cancellation.
pub async fn sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => false,

        _ = tokio::time::sleep(duration) => true,
    }
}
