//! Traffic metering: hot-path byte counters and their background flushers
//!
//! Each job owns two [`TrafficWriter`]s, one for attempted bytes and one for
//! delivered bytes. The job loop only ever touches a [`TrafficCounter`], which
//! is a single relaxed atomic add. The writer task owns flushing: on every tick
//! it swaps the accumulator to zero and forwards the delta to a
//! [`MetricsSink`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Which traffic stream a byte count belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Bytes handed to the transport, whatever the outcome
    Attempted,
    /// Bytes of exchanges the transport confirmed as successful
    Delivered,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Attempted => write!(f, "attempted"),
            StreamKind::Delivered => write!(f, "delivered"),
        }
    }
}

/// Outcome of a single request/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeOutcome {
    /// Transport reported success
    Success,
    /// Transport reported failure
    Fail,
}

/// Destination for flushed traffic deltas and exchange counters
pub trait MetricsSink: Send + Sync {
    /// Add `bytes` to the stream identified by `(kind, instance_id)`
    fn write(&self, kind: StreamKind, instance_id: &str, bytes: u64);

    /// Count one exchange against `(host, method, outcome)`
    fn inc_exchange(&self, host: &str, method: &str, outcome: ExchangeOutcome);
}

// ============================================================================
// Traffic Writer
// ============================================================================

/// Cloneable hot-path handle onto a writer's accumulator
#[derive(Debug, Clone)]
pub struct TrafficCounter {
    pending: Arc<AtomicU64>,
}

impl TrafficCounter {
    /// Add `bytes` to the accumulator. Never blocks.
    #[inline]
    pub fn add(&self, bytes: u64) {
        self.pending.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes accumulated since the last flush
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }
}

/// Accumulates bytes for one metric stream and flushes them periodically
pub struct TrafficWriter {
    kind: StreamKind,
    instance_id: String,
    pending: Arc<AtomicU64>,
    sink: Arc<dyn MetricsSink>,
}

impl TrafficWriter {
    /// Create a writer with a fresh instance identity
    pub fn new(sink: Arc<dyn MetricsSink>, kind: StreamKind) -> Self {
        Self::with_instance_id(sink, kind, uuid::Uuid::new_v4().to_string())
    }

    /// Create a writer with an explicit instance identity
    pub fn with_instance_id(
        sink: Arc<dyn MetricsSink>,
        kind: StreamKind,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            instance_id: instance_id.into(),
            pending: Arc::new(AtomicU64::new(0)),
            sink,
        }
    }

    /// Stream kind
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Instance identity used when flushing to the sink
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Handle for the hot path
    pub fn counter(&self) -> TrafficCounter {
        TrafficCounter {
            pending: Arc::clone(&self.pending),
        }
    }

    /// Add bytes directly through the writer
    pub fn add(&self, bytes: u64) {
        self.pending.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Swap the accumulator out and forward a non-zero delta to the sink
    ///
    /// Returns the number of bytes flushed.
    pub fn flush(&self) -> u64 {
        let delta = self.pending.swap(0, Ordering::AcqRel);
        if delta > 0 {
            self.sink.write(self.kind, &self.instance_id, delta);
        }
        delta
    }

    /// Flush on every `interval` tick until `cancel` fires
    ///
    /// A final flush runs after cancellation so nothing added before the
    /// token fired is lost.
    pub async fn update(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    self.flush();
                }
            }
        }

        let flushed = self.flush();
        tracing::trace!(
            stream = %self.kind,
            instance = %self.instance_id,
            flushed,
            "Traffic writer stopped"
        );
    }
}

impl std::fmt::Debug for TrafficWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficWriter")
            .field("kind", &self.kind)
            .field("instance_id", &self.instance_id)
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// In-memory sink
// ============================================================================

/// Totals reported to an [`InMemoryMetrics`] sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficSummary {
    /// Bytes attempted
    pub attempted_bytes: u64,
    /// Bytes delivered
    pub delivered_bytes: u64,
    /// Exchanges that succeeded
    pub successful_exchanges: u64,
    /// Exchanges that failed
    pub failed_exchanges: u64,
}

impl TrafficSummary {
    /// Delivered / attempted, in 0.0 - 1.0
    pub fn delivery_ratio(&self) -> f64 {
        if self.attempted_bytes == 0 {
            0.0
        } else {
            self.delivered_bytes as f64 / self.attempted_bytes as f64
        }
    }
}

#[derive(Debug, Default)]
struct Totals {
    streams: HashMap<(StreamKind, String), u64>,
    exchanges: HashMap<(String, String, ExchangeOutcome), u64>,
}

/// Metrics sink that keeps every counter in memory
///
/// Used by the binary for periodic reporting and by tests to observe what the
/// job loop recorded.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    totals: Mutex<Totals>,
}

impl InMemoryMetrics {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum over every instance of a stream kind
    pub fn total(&self, kind: StreamKind) -> u64 {
        self.totals
            .lock()
            .streams
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, bytes)| *bytes)
            .sum()
    }

    /// Total for one `(kind, instance)` stream
    pub fn instance_total(&self, kind: StreamKind, instance_id: &str) -> u64 {
        self.totals
            .lock()
            .streams
            .get(&(kind, instance_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct instances that reported for a stream kind
    pub fn instances(&self, kind: StreamKind) -> usize {
        self.totals
            .lock()
            .streams
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Exchange count for `(host, method, outcome)`
    pub fn exchanges(&self, host: &str, method: &str, outcome: ExchangeOutcome) -> u64 {
        self.totals
            .lock()
            .exchanges
            .get(&(host.to_string(), method.to_string(), outcome))
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of the aggregate totals
    pub fn summary(&self) -> TrafficSummary {
        let totals = self.totals.lock();
        let mut summary = TrafficSummary::default();

        for ((kind, _), bytes) in &totals.streams {
            match kind {
                StreamKind::Attempted => summary.attempted_bytes += bytes,
                StreamKind::Delivered => summary.delivered_bytes += bytes,
            }
        }
        for ((_, _, outcome), count) in &totals.exchanges {
            match outcome {
                ExchangeOutcome::Success => summary.successful_exchanges += count,
                ExchangeOutcome::Fail => summary.failed_exchanges += count,
            }
        }

        summary
    }
}

impl MetricsSink for InMemoryMetrics {
    fn write(&self, kind: StreamKind, instance_id: &str, bytes: u64) {
        let mut totals = self.totals.lock();
        let entry = totals
            .streams
            .entry((kind, instance_id.to_string()))
            .or_insert(0);
        *entry = entry.saturating_add(bytes);
    }

    fn inc_exchange(&self, host: &str, method: &str, outcome: ExchangeOutcome) {
        *self
            .totals
            .lock()
            .exchanges
            .entry((host.to_string(), method.to_string(), outcome))
            .or_insert(0) += 1;
    }
}
