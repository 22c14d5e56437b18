//! Transport client trait
//!
//! The trait is defined in core so the job loop can drive any transport.
//! Implementations live in the transports crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::request::RequestDescriptor;
use crate::response::RawResponse;
use crate::traffic::{ExchangeOutcome, MetricsSink};

// ============================================================================
// Transport Client Trait
// ============================================================================

/// Executes one request/response exchange
///
/// Implementations own connection reuse, TLS and proxy handling. The job loop
/// only hands over descriptors and reads the outcome.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Transport identifier (e.g., "http")
    fn name(&self) -> &str;

    /// Send `request`; when `response` is given, fill it with what came back
    ///
    /// A response body is read to completion either way so connections can be
    /// reused.
    async fn send(
        &self,
        request: &RequestDescriptor,
        response: Option<&mut RawResponse>,
    ) -> Result<(), TransportError>;
}

/// Transport errors
///
/// Messages never contain the request URL, so they are safe to log in
/// standard mode. Confidential mode logs [`TransportError::kind`] only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection or protocol failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request did not complete in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Response status the transport is configured to treat as failure
    #[error("unexpected status {0}")]
    Status(u16),

    /// Descriptor could not be turned into a request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Client construction failed
    #[error("failed to build client: {0}")]
    Build(String),

    /// The job was cancelled while the exchange was in flight
    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Short label without any target details
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Http(_) => "http",
            TransportError::Timeout(_) => "timeout",
            TransportError::Status(_) => "status",
            TransportError::InvalidRequest(_) => "invalid_request",
            TransportError::Build(_) => "build",
            TransportError::Cancelled => "cancelled",
        }
    }

    /// Whether the error only reflects cancellation of the job
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

/// Send one request and count the exchange against `(host, method, outcome)`
pub async fn send_request(
    transport: &dyn TransportClient,
    metrics: &dyn MetricsSink,
    request: &RequestDescriptor,
    response: Option<&mut RawResponse>,
) -> Result<(), TransportError> {
    let result = transport.send(request, response).await;
    let outcome = match result {
        Ok(()) => ExchangeOutcome::Success,
        Err(_) => ExchangeOutcome::Fail,
    };
    metrics.inc_exchange(&request.host, &request.method, outcome);
    result
}
