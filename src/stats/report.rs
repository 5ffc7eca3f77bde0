// Periodic stats report - headless replacement for a live dashboard
//
// Polls the aggregator and the TPS window on a fixed interval and writes one
// summary line to the log. Purely an observer: it never mutates counters.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{format_bytes, SharedStats, StatsSnapshot, TpsTracker};

/// Spawn the reporter task, logging a summary every `every`
pub fn spawn_reporter(
    stats: SharedStats,
    tracker: Arc<TpsTracker>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let snapshot = stats.snapshot();
            let tps = tracker.window();
            tracing::info!(
                uptime_secs = snapshot.uptime.as_secs(),
                total = snapshot.total_requests,
                successful = snapshot.successful_requests,
                failed = snapshot.failed_requests,
                received = %format_bytes(snapshot.bytes_received),
                sent = %format_bytes(snapshot.bytes_sent),
                tps = tps.current,
                peak_tps = tps.peak,
                "{}",
                summary_line(&snapshot)
            );
        }
    })
}

/// One-line description: success rate plus the error breakdown
fn summary_line(snapshot: &StatsSnapshot) -> String {
    let mut line = format!("Success rate {:.2}%", snapshot.success_rate());
    if snapshot.failed_requests == 0 {
        return line;
    }

    let errors: Vec<String> = snapshot
        .error_breakdown()
        .iter()
        .map(|row| {
            format!(
                "{} {}: {} ({:.1}%)",
                row.status, row.description, row.count, row.percent
            )
        })
        .collect();
    line.push_str(" | errors: ");
    line.push_str(&errors.join(", "));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsAggregator;

    #[test]
    fn test_summary_without_errors() {
        let stats = StatsAggregator::new();
        stats.record_success(1, 1);
        assert_eq!(summary_line(&stats.snapshot()), "Success rate 100.00%");
    }

    #[test]
    fn test_summary_lists_errors_by_status() {
        let stats = StatsAggregator::new();
        stats.record_success(0, 0);
        stats.record_failure(500, 0, 0);
        stats.record_failure(429, 0, 0);
        stats.record_failure(429, 0, 0);

        assert_eq!(
            summary_line(&stats.snapshot()),
            "Success rate 25.00% | errors: 429 Too Many Requests: 2 (66.7%), \
             500 Internal Server Error: 1 (33.3%)"
        );
    }
}
