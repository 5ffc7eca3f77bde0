// SSE (Server-Sent Events) relay module
//
// Event streams are relayed chunk by chunk: each upstream chunk is handed to
// the caller as soon as it arrives, with no buffering of the whole body and
// no inspection of the event payloads.
//
// # Architecture
//
// The forwarder spawns a relay task per streamed response. The task reads the
// upstream body and pushes chunks into a bounded channel; the receiving end
// is the caller's response body. When the caller disconnects the receiver is
// dropped, the next send fails, and the task drops the upstream stream.

use axum::http::HeaderMap;
use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

use super::transport::{BodyStream, TransportError};

/// Chunks in flight between the relay task and the caller's body
pub const RELAY_BUFFER: usize = 16;

/// Sending half of a streamed response body
pub type ChunkSender = mpsc::Sender<Result<Bytes, std::io::Error>>;

// ============================================================================
// SSE Detection
// ============================================================================

/// Check if a response is SSE based on content-type header
pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/event-stream"))
        .unwrap_or(false)
}

// ============================================================================
// Relay
// ============================================================================

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream stream failed after {bytes_sent} bytes: {source}")]
    Upstream {
        bytes_sent: u64,
        #[source]
        source: TransportError,
    },

    #[error("caller disconnected after {bytes_sent} bytes")]
    CallerGone { bytes_sent: u64 },
}

impl RelayError {
    /// Bytes delivered to the caller before the relay stopped
    pub fn bytes_sent(&self) -> u64 {
        match self {
            RelayError::Upstream { bytes_sent, .. } | RelayError::CallerGone { bytes_sent } => {
                *bytes_sent
            }
        }
    }
}

/// Copy an upstream body to the caller until either side ends
///
/// Returns the number of bytes delivered. The upstream stream is consumed
/// and dropped on every path. An upstream failure is also pushed into the
/// sink so the caller's connection is aborted rather than ended cleanly.
pub async fn relay(mut upstream: BodyStream, sink: &ChunkSender) -> Result<u64, RelayError> {
    let mut bytes_sent: u64 = 0;

    loop {
        // An idle stream must still notice a caller that went away
        let chunk = tokio::select! {
            chunk = upstream.next() => chunk,
            _ = sink.closed() => return Err(RelayError::CallerGone { bytes_sent }),
        };
        let Some(chunk) = chunk else {
            break;
        };

        match chunk {
            Ok(bytes) => {
                let len = bytes.len() as u64;
                if sink.send(Ok(bytes)).await.is_err() {
                    return Err(RelayError::CallerGone { bytes_sent });
                }
                bytes_sent += len;
            }
            Err(source) => {
                // Caller may already be gone; nothing more to do either way
                let _ = sink
                    .send(Err(std::io::Error::other(source.to_string())))
                    .await;
                return Err(RelayError::Upstream { bytes_sent, source });
            }
        }
    }

    Ok(bytes_sent)
}
