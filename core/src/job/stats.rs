//! Job statistics tracking

use std::time::Instant;

/// Statistics tracked by a running job
#[derive(Debug, Default, Clone)]
pub struct JobStats {
    /// Iterations that reached the send step
    pub iterations: u64,

    /// Exchanges confirmed successful
    pub successes: u64,

    /// Exchanges that failed
    pub failures: u64,

    /// Bytes handed to the transport
    pub attempted_bytes: u64,

    /// Bytes of successful exchanges
    pub delivered_bytes: u64,

    /// Job start time
    pub started_at: Option<Instant>,

    /// Job end time
    pub ended_at: Option<Instant>,
}

impl JobStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Record bytes about to be sent
    pub fn record_attempt(&mut self, bytes: u64) {
        self.iterations += 1;
        self.attempted_bytes += bytes;
    }

    /// Record a successful exchange
    pub fn record_success(&mut self, bytes: u64) {
        self.successes += 1;
        self.delivered_bytes += bytes;
    }

    /// Record a failed exchange
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Success rate over completed exchanges (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        let completed = self.successes + self.failures;
        if completed == 0 {
            0.0
        } else {
            self.successes as f64 / completed as f64
        }
    }

    /// Delivered / attempted bytes (0.0 - 1.0)
    pub fn delivery_ratio(&self) -> f64 {
        if self.attempted_bytes == 0 {
            0.0
        } else {
            self.delivered_bytes as f64 / self.attempted_bytes as f64
        }
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Iterations per second
    pub fn iterations_per_second(&self) -> f64 {
        self.elapsed()
            .map(|d| {
                let secs = d.as_secs_f64();
                if secs > 0.0 {
                    self.iterations as f64 / secs
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0)
    }
}
