//! Forwarding error types and response handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::body::BodyProcessingError;
use super::identity::AuthError;
use super::sse::RelayError;
use super::transport::TransportError;

/// Errors that can occur while forwarding a request
///
/// Upstream responses with error statuses (429, 500, ...) are not errors
/// here: they are relayed like any other response.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid path: empty request path")]
    InvalidPath,

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("no caller identity for request")]
    IdentityMissing,

    #[error("body processing failed: {0}")]
    BodyProcessing(#[from] BodyProcessingError),

    #[error("upstream credential for client '{0}' is not a valid header value")]
    InvalidCredential(String),

    #[error("{0}")]
    UpstreamUnreachable(#[source] TransportError),

    #[error("failed to read upstream response: {0}")]
    ResponseRead(#[source] TransportError),

    #[error("stream relay failed: {0}")]
    StreamRelay(#[from] RelayError),
}

impl ForwardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwardError::InvalidPath | ForwardError::BodyRead(_) => StatusCode::BAD_REQUEST,
            ForwardError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ForwardError::IdentityMissing
            | ForwardError::BodyProcessing(_)
            | ForwardError::InvalidCredential(_)
            | ForwardError::UpstreamUnreachable(_)
            | ForwardError::ResponseRead(_)
            | ForwardError::StreamRelay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Forward error: {}", message);
        } else {
            tracing::warn!(status = status.as_u16(), "Forward error: {}", message);
        }

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
