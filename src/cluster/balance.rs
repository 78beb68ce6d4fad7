//! Node selection strategies.
//!
//! Every strategy returns the *full* active set — selection never shrinks the
//! broadcast, it only reorders it. Aggregate `total_hits` counting is only
//! correct when every reachable node answers, so partial dispatch is not a
//! supported trade here; ordering still expresses the strategy's intent
//! (rotation fairness, weight, load, health) for callers and for any future
//! partial-dispatch mode.
//!
//! The strategy set is closed and dispatched through one `match`. The only
//! mutable state is the rotation cursor (monotonic atomic) and the in-flight
//! gauge used by `LeastConnections`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::node::NodeHandle;

/// How nodes are ordered for one search round.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    /// All active nodes, registry order. The default scatter-gather mode.
    #[default]
    Broadcast,
    /// Rotate the lead node across calls.
    RoundRobin,
    /// Smooth weighted rotation; heavier nodes lead proportionally more often.
    WeightedRoundRobin,
    /// Nodes with fewer in-flight calls first.
    LeastConnections,
    /// Nodes with the best success ratio (then lowest latency) first.
    HealthBased,
}

impl LoadBalanceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::RoundRobin => "round_robin",
            Self::WeightedRoundRobin => "weighted_round_robin",
            Self::LeastConnections => "least_connections",
            Self::HealthBased => "health_based",
        }
    }
}

impl std::fmt::Display for LoadBalanceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(Self::Broadcast),
            "round_robin" => Ok(Self::RoundRobin),
            "weighted_round_robin" => Ok(Self::WeightedRoundRobin),
            "least_connections" => Ok(Self::LeastConnections),
            "health_based" => Ok(Self::HealthBased),
            other => Err(format!("unknown load balancing strategy: {other}")),
        }
    }
}

/// Applies a [`LoadBalanceStrategy`] to a registry snapshot.
#[derive(Debug, Default)]
pub struct Balancer {
    cursor: AtomicUsize,
    inflight: Mutex<HashMap<String, usize>>,
}

impl Balancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order the snapshot for one round. The snapshot arrives id-ordered
    /// from the registry; ties in every strategy fall back to that order, so
    /// output is deterministic given (snapshot, strategy, cursor, gauge).
    pub fn select(
        &self,
        mut snapshot: Vec<NodeHandle>,
        strategy: LoadBalanceStrategy,
    ) -> Vec<NodeHandle> {
        if snapshot.len() <= 1 {
            return snapshot;
        }
        match strategy {
            LoadBalanceStrategy::Broadcast => snapshot,
            LoadBalanceStrategy::RoundRobin => {
                let shift = self.cursor.fetch_add(1, Ordering::Relaxed) % snapshot.len();
                snapshot.rotate_left(shift);
                snapshot
            }
            LoadBalanceStrategy::WeightedRoundRobin => {
                let advance = self.cursor.fetch_add(1, Ordering::Relaxed) % snapshot.len();
                let order = weighted_order(&snapshot, advance);
                reorder(snapshot, &order)
            }
            LoadBalanceStrategy::LeastConnections => {
                let gauge = self.inflight.lock();
                snapshot
                    .sort_by_key(|n| gauge.get(&n.id).copied().unwrap_or(0));
                snapshot
            }
            LoadBalanceStrategy::HealthBased => {
                snapshot.sort_by(|a, b| {
                    b.stats
                        .success_ratio()
                        .total_cmp(&a.stats.success_ratio())
                        .then_with(|| {
                            a.stats
                                .average_latency_ms()
                                .total_cmp(&b.stats.average_latency_ms())
                        })
                });
                snapshot
            }
        }
    }

    /// Note a dispatch to `id`. Pairs with [`Balancer::finish`].
    pub fn begin(&self, id: &str) {
        *self.inflight.lock().entry(id.to_string()).or_insert(0) += 1;
    }

    /// Note completion of a dispatch to `id`.
    pub fn finish(&self, id: &str) {
        let mut gauge = self.inflight.lock();
        if let Some(count) = gauge.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                gauge.remove(id);
            }
        }
    }

    /// Current in-flight calls against `id`.
    pub fn inflight(&self, id: &str) -> usize {
        self.inflight.lock().get(id).copied().unwrap_or(0)
    }
}

/// Smooth weighted round-robin ordering (the nginx algorithm), emitting each
/// index once in first-occurrence order. `advance` skips that many picks
/// first so the lead rotates across calls. Zero-weight nodes trail in input
/// order.
fn weighted_order(nodes: &[NodeHandle], advance: usize) -> Vec<usize> {
    let n = nodes.len();
    let weights: Vec<f64> = nodes.iter().map(|node| node.weight.max(0.0)).collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        let mut order: Vec<usize> = (0..n).collect();
        order.rotate_left(advance % n);
        return order;
    }

    let mut current = vec![0.0_f64; n];
    let mut order = Vec::with_capacity(n);
    let mut seen = vec![false; n];
    // Extreme weight ratios could delay a light node's first pick almost
    // arbitrarily; cap the walk and flush stragglers in input order.
    let cap = advance + 256 * n;
    for step in 0..cap {
        let mut best = 0;
        for i in 0..n {
            current[i] += weights[i];
            if current[i] > current[best] {
                best = i;
            }
        }
        current[best] -= total;
        if step >= advance && !seen[best] {
            seen[best] = true;
            order.push(best);
            if order.len() == n {
                break;
            }
        }
    }
    for i in 0..n {
        if !seen[i] {
            order.push(i);
        }
    }
    order
}

fn reorder(snapshot: Vec<NodeHandle>, order: &[usize]) -> Vec<NodeHandle> {
    let mut slots: Vec<Option<NodeHandle>> = snapshot.into_iter().map(Some).collect();
    order
        .iter()
        .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
        .collect()
}
