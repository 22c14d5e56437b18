//! surge-core: Job loop driver for templated request traffic
//!
//! This crate provides the transport-agnostic pieces of a surge job:
//!
//! - Request templates and the descriptors they materialize into
//! - The [`TransportClient`] trait that transports implement
//! - Exponential backoff and iteration gating
//! - Attempted/delivered traffic metering
//! - The job loop itself and its single-shot variant

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod job;
pub mod request;
pub mod response;
pub mod template;
pub mod traffic;
pub mod traits;

pub use backoff::{BackoffConfig, BackoffConfigError, BackoffController};
pub use config::{ConfigError, ExecutionMode, GlobalConfig, JobConfig, JobKind, RunConfig};
pub use error::*;
pub use job::{GateConfig, Job, JobBuilder, JobStats, SingleShotOutcome};
pub use request::{RequestConfig, RequestDescriptor, RequestMaterializer};
pub use response::{RawResponse, ResponseSnapshot};
pub use template::{
    RequestTemplate, RequestTemplateConfig, TemplateContext, TemplateError, TemplateEvaluator,
};
pub use traffic::{
    ExchangeOutcome, InMemoryMetrics, MetricsSink, StreamKind, TrafficSummary, TrafficWriter,
};
pub use traits::*;
