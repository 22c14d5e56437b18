//! Transport client implementations for surge jobs
//!
//! This crate provides:
//!
//! - [`HttpTransport`], the reqwest-backed `TransportClient`
//! - [`http_job`] and [`single_request_job`], which turn a `JobConfig` into a
//!   running job

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod http;
pub mod jobs;

pub use http::{ClientConfig, HttpTransport};
pub use jobs::{http_job, prepare_http_job, single_request_job};
