//! Job execution loop

use crate::backoff::{BackoffConfig, BackoffController};
use crate::config::ExecutionMode;
use crate::error::JobResult;
use crate::request::{RequestDescriptor, RequestMaterializer};
use crate::template::TemplateContext;
use crate::traffic::{MetricsSink, StreamKind, TrafficCounter, TrafficWriter};
use crate::traits::{send_request, TransportClient, TransportError};

use super::gate::{GateConfig, IterationGate};
use super::sleep;
use super::stats::JobStats;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One configured job: a request template bound to a transport
///
/// Build with [`JobBuilder`](super::JobBuilder). [`Job::run`] loops until the
/// gate denies another iteration or the token is cancelled;
/// [`Job::run_once`](Job::run_once) performs a single exchange.
pub struct Job {
    pub(crate) name: String,
    pub(crate) materializer: RequestMaterializer,
    pub(crate) transport: Arc<dyn TransportClient>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) backoff: BackoffConfig,
    pub(crate) gate: GateConfig,
    pub(crate) mode: ExecutionMode,
    pub(crate) flush_interval: Duration,
    pub(crate) target: Option<String>,
}

/// Hot-path handles onto the job's two traffic writers
struct Meters {
    attempted: TrafficCounter,
    delivered: TrafficCounter,
}

impl Job {
    /// Run the job loop
    ///
    /// Returns the job's stats once the gate is exhausted or `cancel` fires.
    /// Returns an error only when the request template fails to evaluate.
    /// Both traffic writers are stopped and flushed before this returns, on
    /// every exit path.
    pub async fn run(self, cancel: CancellationToken) -> JobResult<JobStats> {
        let scope = cancel.child_token();

        let attempted = TrafficWriter::new(Arc::clone(&self.metrics), StreamKind::Attempted);
        let delivered = TrafficWriter::new(Arc::clone(&self.metrics), StreamKind::Delivered);
        let meters = Meters {
            attempted: attempted.counter(),
            delivered: delivered.counter(),
        };
        let writers = [
            tokio::spawn(attempted.update(self.flush_interval, scope.clone())),
            tokio::spawn(delivered.update(self.flush_interval, scope.clone())),
        ];

        let mut stats = JobStats::new();
        stats.start();

        tracing::debug!(job = %self.name, transport = self.transport.name(), "Job started");
        if !self.mode.is_confidential() {
            if let Some(target) = &self.target {
                tracing::info!(job = %self.name, target = %target, "Sending requests");
            }
        }

        let result = self.drive(&scope, &meters, &mut stats).await;
        stats.stop();

        scope.cancel();
        for writer in writers {
            if let Err(e) = writer.await {
                tracing::warn!(job = %self.name, error = %e, "Traffic writer task failed");
            }
        }

        result?;

        tracing::debug!(
            job = %self.name,
            iterations = stats.iterations,
            successes = stats.successes,
            failures = stats.failures,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Job finished"
        );

        Ok(stats)
    }

    async fn drive(
        &self,
        cancel: &CancellationToken,
        meters: &Meters,
        stats: &mut JobStats,
    ) -> JobResult<()> {
        let mut backoff = BackoffController::new(self.backoff);
        let mut gate = IterationGate::new(&self.gate);
        let mut request = RequestDescriptor::default();

        while gate.next(cancel).await {
            // An always-ready transport must not starve other tasks
            tokio::task::yield_now().await;

            let ctx = TemplateContext::new(&self.name, stats.iterations);
            let size = self.materializer.materialize(&ctx, &mut request)? as u64;

            meters.attempted.add(size);
            stats.record_attempt(size);

            let result = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                result = send_request(
                    self.transport.as_ref(),
                    self.metrics.as_ref(),
                    &request,
                    None,
                ) => result,
            };

            match result {
                Ok(()) => {
                    meters.delivered.add(size);
                    stats.record_success(size);
                    backoff.reset();
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    stats.record_failure();
                    let wait = backoff.increment().timeout();
                    self.log_failure(&request, &e, wait, backoff.failures());

                    if !sleep(wait, cancel).await {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    fn log_failure(
        &self,
        request: &RequestDescriptor,
        error: &TransportError,
        wait: Duration,
        failures: u32,
    ) {
        if self.mode.is_confidential() {
            tracing::debug!(
                job = %self.name,
                kind = error.kind(),
                failures,
                backoff_ms = wait.as_millis() as u64,
                "Error sending request"
            );
        } else {
            tracing::debug!(
                job = %self.name,
                method = %request.method,
                host = %request.host,
                error = %error,
                failures,
                backoff_ms = wait.as_millis() as u64,
                "Error sending request"
            );
        }
    }

    /// Job name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execution mode
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("transport", &self.transport.name())
            .field("backoff", &self.backoff)
            .field("gate", &self.gate)
            .field("mode", &self.mode)
            .field("flush_interval", &self.flush_interval)
            .finish()
    }
}
