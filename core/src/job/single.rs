//! Single-shot variant: one materialize -> send pass returning the response

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::JobResult;
use crate::request::RequestDescriptor;
use crate::response::{RawResponse, ResponseSnapshot};
use crate::template::TemplateContext;
use crate::traffic::StreamKind;
use crate::traits::send_request;

use super::executor::Job;

/// Result of a single exchange
///
/// Transport failures are carried in `error` instead of failing the call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleShotOutcome {
    /// What came back; empty when nothing did
    pub response: ResponseSnapshot,

    /// Transport error, if the exchange failed
    pub error: Option<String>,

    /// Outbound payload size
    pub request_bytes: u64,
}

impl SingleShotOutcome {
    /// Whether the exchange succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl Job {
    /// Materialize and send one request, without gate or backoff
    ///
    /// Template failures are returned as errors; transport failures are
    /// embedded in the outcome.
    pub async fn run_once(&self) -> JobResult<SingleShotOutcome> {
        let ctx = TemplateContext::new(&self.name, 0);
        let mut request = RequestDescriptor::default();
        let size = self.materializer.materialize(&ctx, &mut request)? as u64;

        self.metrics
            .write(StreamKind::Attempted, &uuid::Uuid::new_v4().to_string(), size);

        if !self.mode.is_confidential() {
            tracing::info!(job = %self.name, url = %request.url, "Sending single request");
        }

        let mut raw = RawResponse::default();
        let result = send_request(
            self.transport.as_ref(),
            self.metrics.as_ref(),
            &request,
            Some(&mut raw),
        )
        .await;

        if result.is_ok() {
            self.metrics
                .write(StreamKind::Delivered, &uuid::Uuid::new_v4().to_string(), size);
        }

        Ok(SingleShotOutcome {
            response: ResponseSnapshot::from_raw(&raw, Utc::now()),
            error: result.err().map(|e| e.to_string()),
            request_bytes: size,
        })
    }
}
