// relayapi - credential-injecting relay for LLM provider APIs
//
// Callers talk to this relay with their own client token. The relay swaps it
// for the provider credential configured for that client, forwards the call,
// and passes the response back (streaming event streams as they arrive).
//
// Architecture:
// - Proxy server (axum): catch-all relay route plus read-only /api endpoints
// - Forwarder: path resolution, header rewrite, body hook, upstream transport
// - Stats: lock-free counters, error histogram, sampled TPS window
// - Logging: stdout, optional rotating JSON files, in-memory buffer for /api/logs

mod cli;
mod config;
mod logging;
mod proxy;
mod stats;

use anyhow::Result;
use std::sync::Arc;

use config::Config;
use logging::LogBuffer;
use stats::{spawn_reporter, spawn_sampler, StatsAggregator, TpsTracker};

#[tokio::main]
async fn main() -> Result<()> {
    // Handle CLI commands first (config --show, --path, --init)
    // If a command was handled, exit early
    if cli::handle_cli() {
        return Ok(());
    }

    // A config file that exists but doesn't parse is fatal
    let config = Config::load()?;

    // Precedence: RUST_LOG env var > config file > default "info"
    // The guard must be kept alive for the duration of the program to ensure logs flush
    let log_buffer = LogBuffer::new();
    let _file_guard = logging::init(&config.logging, log_buffer.clone());

    tracing::info!("relayapi v{}", config::VERSION);
    match Config::config_path() {
        Some(path) if path.exists() => tracing::info!("Config: {}", path.display()),
        _ => tracing::info!("Config: defaults (no config file)"),
    }
    for warning in config.clients.validate() {
        tracing::warn!("Config: {}", warning);
    }

    // One aggregator for the whole process, handed to every consumer
    let stats = StatsAggregator::new_shared();
    let tps = Arc::new(TpsTracker::new(config.stats.window, stats.total_requests()));

    let sampler = spawn_sampler(stats.clone(), tps.clone(), config.stats.sample_period());
    let reporter = config
        .stats
        .report_period()
        .map(|every| spawn_reporter(stats.clone(), tps.clone(), every));

    // Create shutdown channel for graceful proxy shutdown
    // This is a oneshot channel - it can only send one signal
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let shared = proxy::SharedState {
        stats: stats.clone(),
        tps,
        logs: log_buffer,
    };
    let mut proxy_handle = tokio::spawn(proxy::start_proxy(config, shared, shutdown_rx));

    // Run until Ctrl+C, or until the server stops on its own (e.g. bind failure)
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutting down...");

            // Signal the proxy to shut down gracefully
            // If the send fails, the proxy has already shut down (which is fine)
            let _ = shutdown_tx.send(());
            match proxy_handle.await {
                Ok(Err(e)) => tracing::error!("Proxy server error: {:#}", e),
                Err(e) => tracing::error!("Proxy task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
        result = &mut proxy_handle => {
            sampler.abort();
            if let Some(reporter) = reporter {
                reporter.abort();
            }
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e.into()),
            };
        }
    }

    sampler.abort();
    if let Some(reporter) = reporter {
        reporter.abort();
    }

    let snapshot = stats.snapshot();
    tracing::info!(
        total = snapshot.total_requests,
        successful = snapshot.successful_requests,
        failed = snapshot.failed_requests,
        "Shutdown complete"
    );
    Ok(())
}
