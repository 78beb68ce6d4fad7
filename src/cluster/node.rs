//! Node identity and runtime state.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rolling health/performance counters for one node.
///
/// Fed by health probes and by live search outcomes; probes additionally
/// stamp `last_checked`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_latency_ms: u64,
    pub last_checked: Option<DateTime<Utc>>,
}

impl NodeStats {
    /// Mean latency over successful calls, 0 when none completed.
    pub fn average_latency_ms(&self) -> f64 {
        if self.success_count == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.success_count as f64
        }
    }

    /// Fraction of calls that succeeded, 1.0 when nothing was recorded yet
    /// (a fresh node should not be ranked behind a failing one).
    pub fn success_ratio(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }
}

/// One search node as tracked by the registry.
///
/// `id` and `locator` are fixed at creation; `weight`, `active`, and `stats`
/// mutate in place under the registry's lock. Snapshots hand out clones, so a
/// handle outside the registry is always a point-in-time copy.
#[derive(Debug, Clone, Serialize)]
pub struct NodeHandle {
    pub id: String,
    pub locator: String,
    pub weight: f64,
    pub active: bool,
    pub stats: NodeStats,
}

impl NodeHandle {
    /// New node, active by default, with empty counters.
    pub fn new(id: impl Into<String>, locator: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
            weight,
            active: true,
            stats: NodeStats::default(),
        }
    }
}
