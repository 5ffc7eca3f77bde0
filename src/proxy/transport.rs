//! Outbound HTTP transport
//!
//! The forwarder talks to providers only through the `Transport` trait, so
//! the reqwest client can be swapped for an in-memory fake in tests.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use thiserror::Error;

use crate::config::UpstreamConfig;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connect, DNS, TLS or timeout before a response arrived
    #[error("upstream request failed: {0}")]
    Send(String),

    #[error("upstream body read failed: {0}")]
    Read(String),
}

/// Response body as it arrives from the provider
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Everything needed to issue one upstream request
#[derive(Debug, Clone)]
pub struct ForwardTarget {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Upstream status and headers, with the body not yet read
///
/// Dropping the response releases the upstream connection.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl UpstreamResponse {
    /// Buffer the whole body
    pub async fn read_all(self) -> Result<Bytes, TransportError> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: ForwardTarget) -> Result<UpstreamResponse, TransportError>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
    /// Time allowed until response headers arrive
    header_timeout: Duration,
}

impl ReqwestTransport {
    /// Build the HTTP client with timeouts and connection pooling
    ///
    /// There is no whole-request timeout: it would also bound the body read
    /// and cut long event streams. The read timeout resets on every chunk.
    pub fn from_config(config: &UpstreamConfig) -> anyhow::Result<Self> {
        // No default User-Agent: the caller's User-Agent is forwarded as-is.
        // No decompression features are enabled, so bodies are relayed byte for byte.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.timeout())
            .pool_max_idle_per_host(10)
            // Force HTTP/1.1 to avoid HTTP/2 connection reset issues with some providers
            .http1_only()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            header_timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, target: ForwardTarget) -> Result<UpstreamResponse, TransportError> {
        let request = self
            .client
            .request(target.method, &target.url)
            .headers(target.headers)
            .body(target.body)
            .send();

        let response = tokio::time::timeout(self.header_timeout, request)
            .await
            .map_err(|_| {
                TransportError::Send(format!(
                    "no response headers within {}s",
                    self.header_timeout.as_secs()
                ))
            })?
            .map_err(|e| TransportError::Send(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(|e| TransportError::Read(e.to_string()))
            .boxed();

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
