//! Read-only observer endpoints
//!
//! `/api/stats` and `/api/logs` only read shared state. Dashboards poll them;
//! nothing here mutates the counters.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::logging::LogEntry;
use crate::stats::{format_bytes, ErrorShare, StatsSnapshot, TpsWindow};

use super::state::ProxyState;

// ─────────────────────────────────────────────────────────────────────────────
// Response types
// ─────────────────────────────────────────────────────────────────────────────

/// Response for /api/stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub started_at: String,
    pub uptime_secs: u64,
    pub requests: RequestCounts,
    pub bytes: ByteCounts,
    pub errors: Vec<ErrorRow>,
    pub tps: TpsInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestCounts {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ByteCounts {
    pub received: u64,
    pub sent: u64,
    pub received_human: String,
    pub sent_human: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRow {
    pub status: u16,
    pub description: &'static str,
    pub count: u64,
    pub percent: f64,
}

impl From<ErrorShare> for ErrorRow {
    fn from(share: ErrorShare) -> Self {
        Self {
            status: share.status,
            description: share.description,
            count: share.count,
            percent: share.percent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TpsInfo {
    pub current: f64,
    pub peak: f64,
    pub window: usize,
    pub samples: Vec<f64>,
}

impl StatsResponse {
    pub fn build(
        snapshot: &StatsSnapshot,
        tps: TpsWindow,
        window: usize,
        started_at: String,
    ) -> Self {
        Self {
            started_at,
            uptime_secs: snapshot.uptime.as_secs(),
            requests: RequestCounts {
                total: snapshot.total_requests,
                successful: snapshot.successful_requests,
                failed: snapshot.failed_requests,
                success_rate: snapshot.success_rate(),
            },
            bytes: ByteCounts {
                received: snapshot.bytes_received,
                sent: snapshot.bytes_sent,
                received_human: format_bytes(snapshot.bytes_received),
                sent_human: format_bytes(snapshot.bytes_sent),
            },
            errors: snapshot
                .error_breakdown()
                .into_iter()
                .map(ErrorRow::from)
                .collect(),
            tps: TpsInfo {
                current: tps.current,
                peak: tps.peak,
                window,
                samples: tps.samples,
            },
        }
    }
}

/// Query parameters for /api/logs
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Number of most recent entries (default: all retained)
    pub limit: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/stats
pub async fn get_stats(State(state): State<ProxyState>) -> Json<StatsResponse> {
    let snapshot = state.stats.snapshot();
    Json(StatsResponse::build(
        &snapshot,
        state.tps.window(),
        state.tps.capacity(),
        state.stats.started_at().to_rfc3339(),
    ))
}

/// GET /api/logs
pub async fn get_logs(
    State(state): State<ProxyState>,
    Query(params): Query<LogsQuery>,
) -> Json<Vec<LogEntry>> {
    Json(state.logs.recent(params.limit.unwrap_or(usize::MAX)))
}
