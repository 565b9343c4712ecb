//! Upload transport seam and the single-submission adapter around it.

use crate::stats::{StatTags, UploadStats, UploadTimer, PAYLOAD_SIZE};
use crate::UploadResult;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Terminal response of a transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

/// Network call used to deliver an upload payload.
///
/// Implementations own their retry policy; callers only see the last attempt.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// POST `payload` to `url`, giving up after `timeout` per attempt.
    async fn post(&self, url: &str, payload: Vec<u8>, timeout: Duration)
        -> UploadResult<TransportResponse>;
}

/// What the reconciler gets to see of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResult {
    /// The transport returned HTTP 200 with this body.
    Delivered(Vec<u8>),
    /// No 200 response; `status` is `None` when no response arrived at all.
    Failed {
        /// Terminal HTTP status, if any.
        status: Option<u16>,
    },
}

/// Submit one payload through `transport`, observing size and latency.
pub async fn submit_upload(
    transport: &dyn UploadTransport,
    stats: &dyn UploadStats,
    url: &str,
    payload: Vec<u8>,
    timeout: Duration,
    tags: &StatTags,
) -> TransportResult {
    stats.record_size(PAYLOAD_SIZE, payload.len(), tags);
    let timer = UploadTimer::start(stats, tags);

    debug!(dest_type = %tags.dest_type, url = %url, bytes = payload.len(), "File upload started");
    let result = transport.post(url, payload, timeout).await;
    timer.end();
    debug!(dest_type = %tags.dest_type, url = %url, "File upload finished");

    match result {
        Ok(response) if response.status == 200 => TransportResult::Delivered(response.body),
        Ok(response) => {
            warn!(
                dest_type = %tags.dest_type,
                url = %url,
                status = response.status,
                "Upload returned non-200 status"
            );
            TransportResult::Failed {
                status: Some(response.status),
            }
        }
        Err(e) => {
            warn!(dest_type = %tags.dest_type, url = %url, error = %e, "Upload call failed");
            TransportResult::Failed { status: None }
        }
    }
}
