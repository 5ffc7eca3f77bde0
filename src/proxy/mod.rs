// Proxy module - HTTP relay between callers and provider backends
//
// Each inbound request is authenticated into a `CallerIdentity`, then handed
// to the `RequestForwarder`, which resolves the provider URL, rewrites the
// headers, sends the request upstream and relays the response back (streamed
// for event streams, buffered otherwise).

pub mod api;
pub mod body;
pub mod error;
pub mod forwarder;
pub mod headers;
mod helpers;
pub mod identity;
pub mod path;
mod server;
pub mod sse;
mod state;
pub mod transport;

pub use server::{router, start_proxy};
pub use state::{ProxyState, SharedState};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};

/// Upstream-relative path of a request: no leading `/`, query kept
///
/// The bare root yields an empty path.
fn raw_path(uri: &Uri) -> String {
    let path = uri.path().strip_prefix('/').unwrap_or(uri.path());
    match uri.query() {
        Some(query) if !path.is_empty() => format!("{}?{}", path, query),
        _ => path.to_string(),
    }
}

/// Catch-all handler: authenticate, then forward
async fn proxy_handler(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let identity = match state.authenticator.authenticate(&headers) {
        Ok(identity) => identity,
        Err(e) => return state.forwarder.fail(e.into(), 0).into_response(),
    };

    state
        .forwarder
        .handle(method, &raw_path(&uri), &headers, body, identity)
        .await
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, ClientsConfig, ProviderConfig, UpstreamConfig};
    use crate::logging::LogBuffer;
    use crate::stats::{SharedStats, StatsAggregator, TpsTracker};
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    use super::body::ClientBodyProcessor;
    use super::forwarder::RequestForwarder;
    use super::identity::ClientAuthenticator;
    use super::transport::ReqwestTransport;

    fn clients(base_url: &str) -> ClientsConfig {
        let mut config = ClientsConfig::default();
        config.providers.insert(
            "fake".to_string(),
            ProviderConfig {
                base_url: base_url.to_string(),
                name: None,
            },
        );
        config.clients.insert(
            "dev".to_string(),
            ClientConfig {
                token: "relay-token".to_string(),
                name: None,
                provider: "fake".to_string(),
                api_key: Some("sk-upstream".to_string()),
                api_key_env: None,
                path_override: None,
                body_overrides: HashMap::new(),
            },
        );
        config
    }

    fn app(clients: ClientsConfig) -> (Router, SharedStats) {
        let stats = StatsAggregator::new_shared();
        let forwarder = RequestForwarder::new(
            Arc::new(ReqwestTransport::from_config(&UpstreamConfig::default()).unwrap()),
            Arc::new(ClientBodyProcessor::from_config(&clients)),
            Arc::new(clients.clone()),
            stats.clone(),
        );
        let state = ProxyState {
            forwarder: Arc::new(forwarder),
            authenticator: Arc::new(ClientAuthenticator::from_config(&clients)),
            stats: stats.clone(),
            tps: Arc::new(TpsTracker::new(60, 0)),
            logs: LogBuffer::new(),
        };
        (router(state), stats)
    }

    /// Fake provider on an ephemeral port
    async fn spawn_upstream() -> String {
        async fn completions(headers: HeaderMap, body: String) -> axum::Json<serde_json::Value> {
            axum::Json(serde_json::json!({
                "authorization": headers.get("authorization").and_then(|v| v.to_str().ok()),
                "body": body,
            }))
        }

        async fn stream() -> Response {
            (
                [("content-type", "text/event-stream")],
                "data: one\n\ndata: two\n\n",
            )
                .into_response()
        }

        let upstream = Router::new()
            .route("/chat/completions", post(completions))
            .route("/stream", post(stream));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, upstream).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(r#"{"model":"m"}"#)).unwrap()
    }

    #[test]
    fn test_raw_path() {
        let uri: Uri = "/v1/models?limit=5".parse().unwrap();
        assert_eq!(raw_path(&uri), "v1/models?limit=5");

        let uri: Uri = "/".parse().unwrap();
        assert_eq!(raw_path(&uri), "");

        let uri: Uri = "/?x=1".parse().unwrap();
        assert_eq!(raw_path(&uri), "");
    }

    #[tokio::test]
    async fn test_unknown_token_is_401_and_counted() {
        let (app, stats) = app(clients("http://127.0.0.1:9"));

        let response = app
            .oneshot(request("/v1/chat/completions", Some("wrong")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(stats.snapshot().error_histogram.get(&401), Some(&1));
    }

    #[tokio::test]
    async fn test_root_path_is_400() {
        let (app, stats) = app(clients("http://127.0.0.1:9"));

        let response = app.oneshot(request("/", Some("relay-token"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(stats.snapshot().error_histogram.get(&400), Some(&1));
    }

    #[tokio::test]
    async fn test_no_clients_is_500() {
        let (app, _) = app(ClientsConfig::default());

        let response = app
            .oneshot(request("/v1/chat/completions", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (app, _) = app(ClientsConfig::default());

        let response = app
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["requests"]["total"], 0);
        assert_eq!(json["tps"]["window"], 60);
    }

    #[tokio::test]
    async fn test_relays_to_real_upstream() {
        let base = spawn_upstream().await;
        let (app, stats) = app(clients(&base));

        let response = app
            .oneshot(request("/v1/chat/completions", Some("relay-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["authorization"], "Bearer sk-upstream");
        assert_eq!(json["body"], r#"{"model":"m"}"#);
        assert_eq!(stats.snapshot().successful_requests, 1);
    }

    #[tokio::test]
    async fn test_streams_from_real_upstream() {
        let base = spawn_upstream().await;
        let (app, stats) = app(clients(&base));

        let response = app
            .oneshot(request("/v1/stream", Some("relay-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, "data: one\n\ndata: two\n\n");
        assert_eq!(stats.snapshot().successful_requests, 1);
    }
}
