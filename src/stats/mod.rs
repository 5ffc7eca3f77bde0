//! Live relay counters
//!
//! Every request-handling task writes into one `StatsAggregator` that is
//! created at startup and handed out as an `Arc`. Counters are plain atomics;
//! the per-status error histogram is a sharded `DashMap` whose entries are
//! themselves atomics, so a new status code only locks its own shard and
//! increments of known codes only take a shard read lock.
//!
//! Readers (the `/api/stats` endpoint, the periodic reporter) take a
//! `StatsSnapshot`. Fields are loaded one at a time, so a snapshot taken while
//! requests complete may mix values from slightly different instants.

mod report;
mod tps;

pub use report::spawn_reporter;
pub use tps::{spawn_sampler, TpsTracker, TpsWindow};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Aggregator shared between the proxy, the sampler and the stats endpoint
pub type SharedStats = Arc<StatsAggregator>;

// ─────────────────────────────────────────────────────────────────────────────
// Aggregator
// ─────────────────────────────────────────────────────────────────────────────

/// Process-lifetime request counters
#[derive(Debug)]
pub struct StatsAggregator {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    /// status code -> occurrences; only codes that actually occurred are present
    error_statuses: DashMap<u16, AtomicU64>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            error_statuses: DashMap::new(),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Create an aggregator wrapped for sharing across tasks
    pub fn new_shared() -> SharedStats {
        Arc::new(Self::new())
    }

    pub fn increment_total(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_success(&self) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Count one occurrence of `status`
    ///
    /// Known codes are bumped under a shard read lock. The first occurrence of
    /// a code inserts its counter under that shard's write lock; concurrent
    /// first occurrences race on `entry` and both increments land.
    pub fn increment_error_status(&self, status: u16) {
        if let Some(counter) = self.error_statuses.get(&status) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.error_statuses
            .entry(status)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that completed successfully
    pub fn record_success(&self, bytes_received: u64, bytes_sent: u64) {
        self.increment_total();
        self.increment_success();
        self.add_bytes_received(bytes_received);
        self.add_bytes_sent(bytes_sent);
    }

    /// Record a request that failed with `status`
    pub fn record_failure(&self, status: u16, bytes_received: u64, bytes_sent: u64) {
        self.increment_total();
        self.increment_failed();
        self.increment_error_status(status);
        self.add_bytes_received(bytes_received);
        self.add_bytes_sent(bytes_sent);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wall-clock time the aggregator was created
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Copy of the error histogram, ordered by status code
    pub fn error_histogram(&self) -> BTreeMap<u16, u64> {
        self.error_statuses
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// Point-in-time view of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            error_histogram: self.error_histogram(),
            uptime: self.uptime(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only copy of the counters
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub error_histogram: BTreeMap<u16, u64>,
    pub uptime: Duration,
}

/// One row of the error breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorShare {
    pub status: u16,
    pub description: &'static str,
    pub count: u64,
    /// Share of `failed_requests`, 0-100
    pub percent: f64,
}

impl StatsSnapshot {
    /// Success rate as percentage (0-100)
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }

    /// Error histogram rows sorted by status code, with percentages of failed requests
    pub fn error_breakdown(&self) -> Vec<ErrorShare> {
        self.error_histogram
            .iter()
            .map(|(&status, &count)| ErrorShare {
                status,
                description: status_description(status),
                count,
                percent: if self.failed_requests == 0 {
                    0.0
                } else {
                    count as f64 / self.failed_requests as f64 * 100.0
                },
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formatting helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Human-readable reason phrase for the status codes the relay commonly sees
pub fn status_description(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Error",
    }
}

/// Format a byte count with binary units: `512 B`, `1.50 KiB`, `3.00 MiB`
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let suffix = b"KMGTPE"[exp] as char;
    format!("{:.2} {}iB", bytes as f64 / div as f64, suffix)
}
