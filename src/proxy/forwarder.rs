//! Request forwarding pipeline
//!
//! One call to `RequestForwarder::handle` per inbound request:
//! path check, body read, body processing, target resolution, header
//! rewrite, upstream send, then either a streamed or a buffered relay.
//! Every request is counted in the stats exactly once, when it completes.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::ClientsConfig;
use crate::stats::SharedStats;

use super::body::BodyProcessor;
use super::error::ForwardError;
use super::headers::{allow_origin, response_headers, rewrite_request_headers};
use super::identity::CallerIdentity;
use super::path;
use super::sse::{is_event_stream, relay, RELAY_BUFFER};
use super::transport::{BodyStream, ForwardTarget, Transport};

/// Largest inbound body accepted before the read fails
const MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;

/// What the caller gets back
#[derive(Debug)]
pub struct ForwardResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    pub streaming: bool,
}

impl IntoResponse for ForwardResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if self.streaming {
            // Disable nginx buffering in front of the relay
            response
                .headers_mut()
                .insert("x-accel-buffering", HeaderValue::from_static("no"));
        }
        response
    }
}

/// Per-request fields carried into log lines
struct RequestLog {
    method: Method,
    path: String,
    client: String,
    provider: String,
    status: u16,
    started: Instant,
    bytes_received: u64,
}

impl RequestLog {
    fn relayed(&self, bytes_sent: u64, streaming: bool) {
        tracing::info!(
            method = %self.method,
            path = %self.path,
            client = %self.client,
            provider = %self.provider,
            status = self.status,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            streaming,
            bytes_sent,
            "Request relayed"
        );
    }
}

/// Orchestrates one relay per request
pub struct RequestForwarder {
    transport: Arc<dyn Transport>,
    body_processor: Arc<dyn BodyProcessor>,
    providers: Arc<ClientsConfig>,
    stats: SharedStats,
}

impl RequestForwarder {
    pub fn new(
        transport: Arc<dyn Transport>,
        body_processor: Arc<dyn BodyProcessor>,
        providers: Arc<ClientsConfig>,
        stats: SharedStats,
    ) -> Self {
        Self {
            transport,
            body_processor,
            providers,
            stats,
        }
    }

    /// Count a request that ended in `err` and hand the error back
    pub fn fail(&self, err: ForwardError, bytes_received: u64) -> ForwardError {
        self.stats
            .record_failure(err.status_code().as_u16(), bytes_received, 0);
        err
    }

    pub async fn handle(
        &self,
        method: Method,
        raw_path: &str,
        headers: &HeaderMap,
        body: Body,
        identity: Option<CallerIdentity>,
    ) -> Result<ForwardResponse, ForwardError> {
        let started = Instant::now();

        if raw_path.is_empty() {
            return Err(self.fail(ForwardError::InvalidPath, 0));
        }

        let body = axum::body::to_bytes(body, MAX_REQUEST_BODY)
            .await
            .map_err(|e| self.fail(ForwardError::BodyRead(e.to_string()), 0))?;
        let bytes_received = body.len() as u64;

        let identity =
            identity.ok_or_else(|| self.fail(ForwardError::IdentityMissing, bytes_received))?;

        let body = self
            .body_processor
            .process(&identity, body)
            .map_err(|e| self.fail(e.into(), bytes_received))?;

        let base_url = self.providers.base_url_for(&identity.provider);
        let url = path::resolve(raw_path, &base_url, identity.path_override.as_deref());
        let outbound = rewrite_request_headers(headers, &identity.credential_secret).map_err(|_| {
            self.fail(
                ForwardError::InvalidCredential(identity.client_id.clone()),
                bytes_received,
            )
        })?;

        tracing::debug!(
            client = %identity.client_id,
            method = %method,
            url = %url,
            "Forwarding request"
        );

        let target = ForwardTarget {
            url,
            method: method.clone(),
            headers: outbound,
            body,
        };
        let upstream = self
            .transport
            .send(target)
            .await
            .map_err(|e| self.fail(ForwardError::UpstreamUnreachable(e), bytes_received))?;

        let status = upstream.status;
        let streaming = is_event_stream(&upstream.headers);
        let headers = response_headers(&upstream.headers, allow_origin(headers));
        let log = RequestLog {
            method,
            path: raw_path.to_string(),
            client: identity.client_id,
            provider: identity.provider,
            status: status.as_u16(),
            started,
            bytes_received,
        };

        if streaming {
            let body = self.spawn_relay(upstream.body, log);
            return Ok(ForwardResponse {
                status,
                headers,
                body,
                streaming,
            });
        }

        let bytes = upstream
            .read_all()
            .await
            .map_err(|e| self.fail(ForwardError::ResponseRead(e), bytes_received))?;
        let bytes_sent = bytes.len() as u64;
        self.stats.record_success(bytes_received, bytes_sent);
        log.relayed(bytes_sent, false);

        Ok(ForwardResponse {
            status,
            headers,
            body: Body::from(bytes),
            streaming,
        })
    }

    /// Start relaying an event stream; returns the caller's body
    ///
    /// Stats are recorded when the relay ends, before the caller's body
    /// sees end-of-stream.
    fn spawn_relay(&self, upstream: BodyStream, log: RequestLog) -> Body {
        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        let stats = self.stats.clone();

        tokio::spawn(async move {
            match relay(upstream, &tx).await {
                Ok(bytes_sent) => {
                    stats.record_success(log.bytes_received, bytes_sent);
                    log.relayed(bytes_sent, true);
                }
                Err(e) => {
                    let bytes_sent = e.bytes_sent();
                    let err = ForwardError::from(e);
                    stats.record_failure(
                        err.status_code().as_u16(),
                        log.bytes_received,
                        bytes_sent,
                    );
                    tracing::error!(
                        method = %log.method,
                        path = %log.path,
                        client = %log.client,
                        provider = %log.provider,
                        status = log.status,
                        elapsed_ms = log.started.elapsed().as_millis() as u64,
                        streaming = true,
                        "Forward error: {}",
                        err
                    );
                }
            }
            drop(tx);
        });

        Body::from_stream(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::proxy::body::{ClientBodyProcessor, Passthrough};
    use crate::proxy::transport::{TransportError, UpstreamResponse};
    use crate::stats::StatsAggregator;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted upstream reply
    #[derive(Clone)]
    struct Reply {
        status: StatusCode,
        content_type: &'static str,
        chunks: Vec<Result<Bytes, TransportError>>,
        /// Keep the stream open after the scripted chunks
        hang: bool,
    }

    impl Reply {
        fn json(status: StatusCode, body: &'static str) -> Self {
            Self {
                status,
                content_type: "application/json",
                chunks: vec![Ok(Bytes::from_static(body.as_bytes()))],
                hang: false,
            }
        }

        fn sse(chunks: &[&'static str]) -> Self {
            Self {
                status: StatusCode::OK,
                content_type: "text/event-stream",
                chunks: chunks
                    .iter()
                    .map(|&c| Ok(Bytes::from_static(c.as_bytes())))
                    .collect(),
                hang: false,
            }
        }
    }

    /// In-memory transport that records what it was asked to send
    struct FakeTransport {
        reply: Result<Reply, TransportError>,
        calls: Mutex<Vec<ForwardTarget>>,
    }

    impl FakeTransport {
        fn new(reply: Result<Reply, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<ForwardTarget> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, target: ForwardTarget) -> Result<UpstreamResponse, TransportError> {
            self.calls.lock().unwrap().push(target);
            let reply = self.reply.clone()?;

            let mut headers = HeaderMap::new();
            headers.insert("content-type", HeaderValue::from_static(reply.content_type));
            let body = stream::iter(reply.chunks);
            let body = if reply.hang {
                body.chain(stream::pending()).boxed()
            } else {
                body.boxed()
            };

            Ok(UpstreamResponse {
                status: reply.status,
                headers,
                body,
            })
        }
    }

    fn providers() -> Arc<ClientsConfig> {
        let mut config = ClientsConfig::default();
        config.providers.insert(
            "example".to_string(),
            crate::config::ProviderConfig {
                base_url: "https://api.example.com".to_string(),
                name: None,
            },
        );
        Arc::new(config)
    }

    fn identity() -> CallerIdentity {
        CallerIdentity {
            client_id: "dev".to_string(),
            credential_secret: "sk-upstream".to_string(),
            provider: "example".to_string(),
            path_override: None,
        }
    }

    fn forwarder(transport: Arc<FakeTransport>) -> (RequestForwarder, SharedStats) {
        let stats = StatsAggregator::new_shared();
        let forwarder =
            RequestForwarder::new(transport, Arc::new(Passthrough), providers(), stats.clone());
        (forwarder, stats)
    }

    fn caller_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer relay-token"));
        headers.insert("origin", HeaderValue::from_static("https://foo.com"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers
    }

    async fn read_body(body: Body) -> Result<Bytes, axum::Error> {
        axum::body::to_bytes(body, usize::MAX).await
    }

    #[tokio::test]
    async fn test_empty_path_rejected_without_upstream_call() {
        let transport = FakeTransport::new(Ok(Reply::json(StatusCode::OK, "{}")));
        let (forwarder, stats) = forwarder(transport.clone());

        let result = forwarder
            .handle(Method::GET, "", &caller_headers(), Body::empty(), Some(identity()))
            .await;

        assert!(matches!(result, Err(ForwardError::InvalidPath)));
        assert!(transport.calls().is_empty());
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.error_histogram.get(&400), Some(&1));
    }

    #[tokio::test]
    async fn test_buffered_relay() {
        let transport = FakeTransport::new(Ok(Reply::json(StatusCode::OK, r#"{"id":"x"}"#)));
        let (forwarder, stats) = forwarder(transport.clone());

        let response = forwarder
            .handle(
                Method::POST,
                "v1/chat/completions",
                &caller_headers(),
                Body::from(r#"{"model":"m"}"#),
                Some(identity()),
            )
            .await
            .unwrap();

        assert!(!response.streaming);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers["access-control-allow-origin"], "https://foo.com");
        assert_eq!(read_body(response.body).await.unwrap(), r#"{"id":"x"}"#);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://api.example.com/chat/completions");
        assert_eq!(calls[0].method, Method::POST);
        assert_eq!(calls[0].headers["authorization"], "Bearer sk-upstream");
        assert_eq!(calls[0].body, r#"{"model":"m"}"#);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.bytes_received, 13);
        assert_eq!(snapshot.bytes_sent, 10);
    }

    #[tokio::test]
    async fn test_upstream_error_status_is_a_successful_relay() {
        let transport = FakeTransport::new(Ok(Reply::json(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":"rate limited"}"#,
        )));
        let (forwarder, stats) = forwarder(transport);

        let response = forwarder
            .handle(
                Method::POST,
                "chat/completions",
                &HeaderMap::new(),
                Body::empty(),
                Some(identity()),
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers["access-control-allow-origin"], "*");
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.successful_requests, 1);
        assert!(snapshot.error_histogram.is_empty());
    }

    #[tokio::test]
    async fn test_path_override_used_verbatim() {
        let transport = FakeTransport::new(Ok(Reply::json(StatusCode::OK, "{}")));
        let (forwarder, _) = forwarder(transport.clone());
        let identity = CallerIdentity {
            path_override: Some("v1/models".to_string()),
            ..identity()
        };

        forwarder
            .handle(
                Method::GET,
                "v1/chat/completions",
                &HeaderMap::new(),
                Body::empty(),
                Some(identity),
            )
            .await
            .unwrap();

        assert_eq!(transport.calls()[0].url, "https://api.example.com/v1/models");
    }

    #[tokio::test]
    async fn test_streaming_relay() {
        let transport = FakeTransport::new(Ok(Reply::sse(&[
            "data: {\"delta\":\"He\"}\n\n",
            "data: {\"delta\":\"llo\"}\n\n",
            "data: [DONE]\n\n",
        ])));
        let (forwarder, stats) = forwarder(transport);

        let response = forwarder
            .handle(
                Method::POST,
                "chat/completions",
                &caller_headers(),
                Body::empty(),
                Some(identity()),
            )
            .await
            .unwrap();
        assert!(response.streaming);
        assert_eq!(response.headers["content-type"], "text/event-stream");

        let body = read_body(response.body).await.unwrap();
        assert_eq!(
            body,
            "data: {\"delta\":\"He\"}\n\ndata: {\"delta\":\"llo\"}\n\ndata: [DONE]\n\n"
        );

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.bytes_sent, body.len() as u64);
    }

    #[tokio::test]
    async fn test_chunks_reach_caller_while_upstream_open() {
        let mut reply = Reply::sse(&["data: first\n\n"]);
        reply.hang = true;
        let (forwarder, stats) = forwarder(FakeTransport::new(Ok(reply)));

        let response = forwarder
            .handle(
                Method::POST,
                "chat/completions",
                &HeaderMap::new(),
                Body::empty(),
                Some(identity()),
            )
            .await
            .unwrap();

        let mut frames = response.body.into_data_stream();
        let first = tokio::time::timeout(Duration::from_secs(1), frames.next())
            .await
            .expect("first frame should arrive before upstream ends")
            .unwrap()
            .unwrap();
        assert_eq!(first, "data: first\n\n");

        // Upstream is still open, so nothing is counted yet
        assert_eq!(stats.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_counted_as_500() {
        let mut reply = Reply::sse(&["data: partial\n\n"]);
        reply.chunks.push(Err(TransportError::Read("reset".to_string())));
        let (forwarder, stats) = forwarder(FakeTransport::new(Ok(reply)));

        let response = forwarder
            .handle(
                Method::POST,
                "chat/completions",
                &HeaderMap::new(),
                Body::empty(),
                Some(identity()),
            )
            .await
            .unwrap();

        // Status line was already committed; the body ends in an error
        assert_eq!(response.status, StatusCode::OK);
        assert!(read_body(response.body).await.is_err());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.error_histogram.get(&500), Some(&1));
    }

    #[tokio::test]
    async fn test_caller_disconnect_stops_relay() {
        let mut reply = Reply::sse(&["data: first\n\n"]);
        reply.hang = true;
        let (forwarder, stats) = forwarder(FakeTransport::new(Ok(reply)));

        let response = forwarder
            .handle(
                Method::POST,
                "chat/completions",
                &HeaderMap::new(),
                Body::empty(),
                Some(identity()),
            )
            .await
            .unwrap();
        drop(response);

        // The relay task notices on its next send; the upstream stream never
        // ends, so the only way out is the dropped receiver.
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.total_requests() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("relay should stop after caller disconnect");

        assert_eq!(stats.snapshot().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_upstream_unreachable() {
        let transport = FakeTransport::new(Err(TransportError::Send("dns failure".to_string())));
        let (forwarder, stats) = forwarder(transport);

        let err = forwarder
            .handle(
                Method::POST,
                "chat/completions",
                &HeaderMap::new(),
                Body::from("{}"),
                Some(identity()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::UpstreamUnreachable(_)));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.bytes_received, 2);
        assert_eq!(snapshot.error_histogram.get(&500), Some(&1));
    }

    #[tokio::test]
    async fn test_buffered_read_failure() {
        let reply = Reply {
            status: StatusCode::OK,
            content_type: "application/json",
            chunks: vec![Err(TransportError::Read("reset".to_string()))],
            hang: false,
        };
        let (forwarder, _) = forwarder(FakeTransport::new(Ok(reply)));

        let err = forwarder
            .handle(Method::GET, "models", &HeaderMap::new(), Body::empty(), Some(identity()))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::ResponseRead(_)));
    }

    #[tokio::test]
    async fn test_missing_identity() {
        let transport = FakeTransport::new(Ok(Reply::json(StatusCode::OK, "{}")));
        let (forwarder, stats) = forwarder(transport.clone());

        let err = forwarder
            .handle(Method::GET, "models", &HeaderMap::new(), Body::empty(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::IdentityMissing));
        assert!(transport.calls().is_empty());
        assert_eq!(stats.snapshot().error_histogram.get(&500), Some(&1));
    }

    #[tokio::test]
    async fn test_body_processing_failure() {
        let mut clients = ClientsConfig::default();
        let mut overrides = HashMap::new();
        overrides.insert("model".to_string(), serde_json::json!("pinned"));
        clients.clients.insert(
            "dev".to_string(),
            ClientConfig {
                token: "t".to_string(),
                name: None,
                provider: "example".to_string(),
                api_key: None,
                api_key_env: None,
                path_override: None,
                body_overrides: overrides,
            },
        );
        let transport = FakeTransport::new(Ok(Reply::json(StatusCode::OK, "{}")));
        let stats = StatsAggregator::new_shared();
        let forwarder = RequestForwarder::new(
            transport.clone(),
            Arc::new(ClientBodyProcessor::from_config(&clients)),
            providers(),
            stats.clone(),
        );

        let err = forwarder
            .handle(
                Method::POST,
                "chat/completions",
                &HeaderMap::new(),
                Body::from("not json"),
                Some(identity()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::BodyProcessing(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(transport.calls().is_empty());
        assert_eq!(stats.snapshot().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_invalid_credential() {
        let transport = FakeTransport::new(Ok(Reply::json(StatusCode::OK, "{}")));
        let (forwarder, _) = forwarder(transport.clone());
        let identity = CallerIdentity {
            credential_secret: "line\nbreak".to_string(),
            ..identity()
        };

        let err = forwarder
            .handle(Method::GET, "models", &HeaderMap::new(), Body::empty(), Some(identity))
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::InvalidCredential(_)));
        assert!(transport.calls().is_empty());
    }
}
