//! Process-wide search counters.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::model::StatsSnapshot;

#[derive(Debug, Default)]
struct Mean {
    count: u64,
    value: f64,
}

/// Counters updated once per completed search, read by monitoring callers.
///
/// Counts are atomics; the latency mean is a single-pass running mean guarded
/// by its own mutex (never recomputed from history). Callers only ever get a
/// [`StatsSnapshot`] copy, never a live reference.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    mean_latency: Mutex<Mean>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed search.
    pub fn record(&self, success: bool, latency_ms: u64) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let mut mean = self.mean_latency.lock();
        mean.count += 1;
        mean.value += (latency_ms as f64 - mean.value) / mean.count as f64;
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mean = self.mean_latency.lock();
        StatsSnapshot {
            total_searches: self.total.load(Ordering::Relaxed),
            successful_searches: self.successful.load(Ordering::Relaxed),
            failed_searches: self.failed.load(Ordering::Relaxed),
            average_response_time_ms: mean.value,
        }
    }
}
