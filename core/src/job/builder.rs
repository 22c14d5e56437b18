//! Builder pattern for Job construction

use crate::backoff::BackoffConfig;
use crate::config::{ConfigError, ExecutionMode};
use crate::error::{JobError, JobResult};
use crate::request::RequestMaterializer;
use crate::template::TemplateEvaluator;
use crate::traffic::MetricsSink;
use crate::traits::TransportClient;

use super::executor::Job;
use super::gate::GateConfig;

use std::sync::Arc;
use std::time::Duration;

/// Builder for creating Job instances
///
/// # Example
/// ```ignore
/// let job = JobBuilder::new("pinger")
///     .template(template)
///     .transport(transport)
///     .metrics(metrics)
///     .backoff(BackoffConfig::default())
///     .gate(GateConfig::default().with_rate_limit(10.0))
///     .build()?;
/// ```
pub struct JobBuilder {
    name: String,
    evaluator: Option<Arc<dyn TemplateEvaluator>>,
    transport: Option<Arc<dyn TransportClient>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    backoff: BackoffConfig,
    gate: GateConfig,
    mode: ExecutionMode,
    flush_interval: Duration,
    target: Option<String>,
}

impl JobBuilder {
    /// Create a new builder for the named job
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evaluator: None,
            transport: None,
            metrics: None,
            backoff: BackoffConfig::default(),
            gate: GateConfig::default(),
            mode: ExecutionMode::Standard,
            flush_interval: Duration::from_secs(1),
            target: None,
        }
    }

    /// Set the request template evaluator
    pub fn template(mut self, evaluator: Arc<dyn TemplateEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Set the transport client
    pub fn transport(mut self, transport: Arc<dyn TransportClient>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the metrics sink
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the backoff parameters
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the iteration gate
    pub fn gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Set the execution mode
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the traffic writer flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Describe the target in the start-up log line (standard mode only)
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Build the Job
    ///
    /// # Errors
    /// Returns an error if a required component is missing or the backoff,
    /// rate limit or flush interval is invalid.
    pub fn build(self) -> JobResult<Job> {
        let evaluator = self.evaluator.ok_or(JobError::missing_config("template"))?;
        let transport = self
            .transport
            .ok_or(JobError::missing_config("transport"))?;
        let metrics = self.metrics.ok_or(JobError::missing_config("metrics"))?;

        self.backoff.validate().map_err(ConfigError::Backoff)?;
        if let Some(rps) = self.gate.rate_limit {
            if !rps.is_finite() || rps <= 0.0 {
                return Err(ConfigError::InvalidRateLimit(rps).into());
            }
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidFlushInterval.into());
        }

        Ok(Job {
            name: self.name,
            materializer: RequestMaterializer::new(evaluator),
            transport,
            metrics,
            backoff: self.backoff,
            gate: self.gate,
            mode: self.mode,
            flush_interval: self.flush_interval,
            target: self.target,
        })
    }
}
