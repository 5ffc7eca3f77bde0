//! Proxy server setup and initialization

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;

use crate::config::Config;

use super::api;
use super::body::{BodyProcessor, ClientBodyProcessor, Passthrough};
use super::forwarder::RequestForwarder;
use super::identity::ClientAuthenticator;
use super::proxy_handler;
use super::state::{ProxyState, SharedState};
use super::transport::ReqwestTransport;

/// Build the router: observer endpoints plus the catch-all relay
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/api/stats", get(api::get_stats))
        .route("/api/logs", get(api::get_logs))
        // Proxy handler (catch-all); "/" is routed too so an empty path
        // reaches the forwarder and is rejected there
        .route("/", any(proxy_handler))
        .route("/*path", any(proxy_handler))
        .with_state(state)
}

/// Start the proxy server
pub async fn start_proxy(
    config: Config,
    shared: SharedState,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    let bind_addr = config.bind_addr;

    let transport = Arc::new(ReqwestTransport::from_config(&config.upstream)?);
    let overrides = ClientBodyProcessor::from_config(&config.clients);
    let body_processor: Arc<dyn BodyProcessor> = if overrides.is_empty() {
        Arc::new(Passthrough)
    } else {
        Arc::new(overrides)
    };
    let authenticator = Arc::new(ClientAuthenticator::from_config(&config.clients));

    // Log client routing config if present
    if config.clients.is_configured() {
        tracing::info!(
            "Client routing enabled: {} client(s), {} provider(s)",
            config.clients.clients.len(),
            config.clients.providers.len()
        );
        let mut ids: Vec<_> = config.clients.clients.keys().collect();
        ids.sort();
        for id in ids {
            let client = &config.clients.clients[id];
            let upstream = match config.clients.providers.get(&client.provider) {
                Some(provider) => provider.display_name().to_string(),
                None => config.clients.base_url_for(&client.provider),
            };
            tracing::info!(
                "  Client '{}': {} -> provider '{}' ({})",
                id,
                client.name.as_deref().unwrap_or(id),
                client.provider,
                upstream
            );
        }
    } else {
        tracing::warn!("No [clients.X] configured: every relayed request will fail with 500");
    }

    let forwarder = RequestForwarder::new(
        transport,
        body_processor,
        Arc::new(config.clients.clone()),
        shared.stats.clone(),
    );

    let state = ProxyState {
        forwarder: Arc::new(forwarder),
        authenticator,
        stats: shared.stats,
        tps: shared.tps,
        logs: shared.logs,
    };

    tracing::info!("Starting proxy on {}", bind_addr);

    // Bind and serve
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", bind_addr))?;

    tracing::info!("Proxy listening on {}", bind_addr);

    // Start serving requests with graceful shutdown
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_rx.await.ok();
        })
        .await
        .context("Server error")?;

    tracing::info!("Proxy server shut down gracefully");
    Ok(())
}
