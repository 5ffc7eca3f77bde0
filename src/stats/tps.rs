//! Transactions-per-second sampling
//!
//! A background task wakes on a fixed period, reads `total_requests`, and
//! pushes the delta since the previous wake into a bounded window. The window
//! is read by observers only; the sampler is its single writer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::SharedStats;

/// Sampled request-rate window
#[derive(Debug)]
pub struct TpsTracker {
    capacity: usize,
    inner: Mutex<TpsState>,
}

#[derive(Debug)]
struct TpsState {
    last_total: u64,
    samples: VecDeque<f64>,
}

/// Read-only copy of the rate window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TpsWindow {
    /// Rate measured in the most recent period
    pub current: f64,
    /// Highest rate still inside the window
    pub peak: f64,
    /// Oldest first
    pub samples: Vec<f64>,
}

impl TpsTracker {
    /// Create a tracker keeping at most `capacity` samples, starting from `initial_total`
    pub fn new(capacity: usize, initial_total: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(TpsState {
                last_total: initial_total,
                samples: VecDeque::with_capacity(capacity),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TpsState> {
        // A panic while holding the lock cannot leave the window half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the counter value observed at the end of a period of length `period`
    ///
    /// Returns the rate for that period. A one-second period makes the rate
    /// equal to the raw delta.
    pub fn record(&self, total: u64, period: Duration) -> f64 {
        let mut state = self.state();
        let delta = total.saturating_sub(state.last_total);
        state.last_total = total;

        let secs = period.as_secs_f64();
        let rate = if secs > 0.0 { delta as f64 / secs } else { delta as f64 };

        if state.samples.len() == self.capacity {
            state.samples.pop_front();
        }
        state.samples.push_back(rate);
        rate
    }

    pub fn window(&self) -> TpsWindow {
        let state = self.state();
        let samples: Vec<f64> = state.samples.iter().copied().collect();
        let current = samples.last().copied().unwrap_or(0.0);
        let peak = samples.iter().copied().fold(0.0, f64::max);
        TpsWindow {
            current,
            peak,
            samples,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Spawn the sampler task
///
/// The first tick of a tokio interval fires immediately; it is consumed before
/// the loop so every recorded sample covers a full period.
pub fn spawn_sampler(
    stats: SharedStats,
    tracker: Arc<TpsTracker>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let rate = tracker.record(stats.total_requests(), period);
            tracing::trace!(tps = rate, "Sampled request rate");
        }
    })
}
