//! Error types for surge-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::template::TemplateError;
use crate::traits::TransportError;

/// Job error type
///
/// Only configuration-time failures surface here. Transient send failures are
/// absorbed by the job loop and never become a `JobError`.
#[derive(Error, Debug)]
pub enum JobError {
    /// Malformed job, client or global configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Request template failed to parse or evaluate
    #[error("error executing request template: {0}")]
    Template(#[from] TemplateError),

    /// Transport client could not be constructed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A required builder component was not supplied
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),
}

impl JobError {
    /// Create a missing-configuration error for the named component
    pub fn missing_config(component: &'static str) -> Self {
        Self::MissingConfig(component)
    }

    /// Whether this error came out of template parsing or evaluation
    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template(_))
    }
}

/// Result type alias
pub type JobResult<T> = std::result::Result<T, JobError>;
