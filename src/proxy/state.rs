//! Proxy state shared by every request handler

use std::sync::Arc;

use crate::logging::LogBuffer;
use crate::stats::{SharedStats, TpsTracker};

use super::forwarder::RequestForwarder;
use super::identity::Authenticator;

/// Shared state for the proxy server
///
/// Cloned into each handler invocation; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct ProxyState {
    /// Forwarding pipeline
    pub(super) forwarder: Arc<RequestForwarder>,
    /// Resolves the caller of each request
    pub(super) authenticator: Arc<dyn Authenticator>,
    /// Request counters, read by /api/stats
    pub(super) stats: SharedStats,
    /// Sampled request rate, read by /api/stats
    pub(super) tps: Arc<TpsTracker>,
    /// Recent log lines, read by /api/logs
    pub(super) logs: LogBuffer,
}

/// Long-lived handles created in main and shared with the server
pub struct SharedState {
    pub stats: SharedStats,
    pub tps: Arc<TpsTracker>,
    pub logs: LogBuffer,
}
