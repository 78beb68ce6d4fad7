//! Thread-safe node registry.
//!
//! The registry is the one mutable structure shared between foreground
//! searches and the background health monitor. All access goes through this
//! API; no caller ever holds a live reference into the map. Snapshots are
//! copies taken under the read lock, so a concurrent `remove` either fully
//! precedes or fully follows any snapshot — there is no half-visible node.
//!
//! A `BTreeMap` keyed by id keeps iteration (and therefore snapshots,
//! node-order merges, and rotation cursors) deterministic.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use super::node::{NodeHandle, NodeStats};
use crate::error::CoordinatorError;

/// Outcome of a single health probe, consumed by [`NodeRegistry::record_probe`].
pub enum ProbeOutcome {
    /// Probe answered within budget; latency in milliseconds.
    Healthy { latency_ms: u64 },
    /// Probe failed or timed out.
    Unhealthy { reason: String },
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<String, NodeHandle>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Fails if the id is already present.
    pub fn add(
        &self,
        id: impl Into<String>,
        locator: impl Into<String>,
        weight: f64,
    ) -> Result<(), CoordinatorError> {
        let id = id.into();
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&id) {
            return Err(CoordinatorError::AlreadyExists { id });
        }
        debug!(node_id = %id, weight, "node registered");
        nodes.insert(id.clone(), NodeHandle::new(id, locator, weight));
        Ok(())
    }

    /// Register a batch of `(id, locator, weight)` triples.
    ///
    /// Each individual add is atomic; the batch is not. The first failure
    /// aborts the remainder and is returned, leaving earlier adds in place.
    pub fn add_batch<I, S, L>(&self, batch: I) -> Result<(), CoordinatorError>
    where
        I: IntoIterator<Item = (S, L, f64)>,
        S: Into<String>,
        L: Into<String>,
    {
        for (id, locator, weight) in batch {
            self.add(id, locator, weight)?;
        }
        Ok(())
    }

    /// Remove a node permanently.
    pub fn remove(&self, id: &str) -> Result<(), CoordinatorError> {
        let mut nodes = self.nodes.write();
        match nodes.remove(id) {
            Some(_) => {
                debug!(node_id = %id, "node removed");
                Ok(())
            }
            None => Err(CoordinatorError::NodeNotFound { id: id.into() }),
        }
    }

    /// Explicitly activate or deactivate a node.
    pub fn set_active(&self, id: &str, active: bool) -> Result<(), CoordinatorError> {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(id) {
            Some(node) => {
                node.active = active;
                debug!(node_id = %id, active, "node status set");
                Ok(())
            }
            None => Err(CoordinatorError::NodeNotFound { id: id.into() }),
        }
    }

    /// Point-in-time copy of one node.
    pub fn get(&self, id: &str) -> Result<NodeHandle, CoordinatorError> {
        self.nodes
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CoordinatorError::NodeNotFound { id: id.into() })
    }

    /// Copy of one node's counters.
    pub fn stats(&self, id: &str) -> Result<NodeStats, CoordinatorError> {
        self.get(id).map(|node| node.stats)
    }

    /// Ordered copies of all currently active nodes.
    pub fn snapshot_active(&self) -> Vec<NodeHandle> {
        self.nodes
            .read()
            .values()
            .filter(|n| n.active)
            .cloned()
            .collect()
    }

    /// Ordered copies of every registered node, active or not.
    pub fn snapshot_all(&self) -> Vec<NodeHandle> {
        self.nodes.read().values().cloned().collect()
    }

    /// Ids of active nodes, in registry order.
    pub fn active_ids(&self) -> Vec<String> {
        self.nodes
            .read()
            .values()
            .filter(|n| n.active)
            .map(|n| n.id.clone())
            .collect()
    }

    /// `(total, active)` counts taken under one lock.
    pub fn counts(&self) -> (usize, usize) {
        let nodes = self.nodes.read();
        let active = nodes.values().filter(|n| n.active).count();
        (nodes.len(), active)
    }

    /// Drop every node. Used on coordinator shutdown.
    pub fn clear(&self) {
        self.nodes.write().clear();
    }

    /// Apply a health probe outcome. A healthy probe reactivates the node
    /// (including one explicitly deactivated by an admin); an unhealthy one
    /// deactivates it. No-op for ids removed since the probe started.
    pub fn record_probe(&self, id: &str, outcome: ProbeOutcome) {
        let mut nodes = self.nodes.write();
        let Some(node) = nodes.get_mut(id) else {
            return;
        };
        node.stats.last_checked = Some(chrono::Utc::now());
        match outcome {
            ProbeOutcome::Healthy { latency_ms } => {
                node.active = true;
                node.stats.success_count += 1;
                node.stats.total_latency_ms += latency_ms;
            }
            ProbeOutcome::Unhealthy { reason } => {
                if node.active {
                    tracing::warn!(node_id = %id, %reason, "probe failed, deactivating node");
                }
                node.active = false;
                node.stats.failure_count += 1;
            }
        }
    }

    /// Fold a live search outcome into the node's counters. Search failures
    /// do not deactivate — only probes and admin calls toggle `active`.
    /// No-op for ids removed while the search was in flight.
    pub fn record_search_result(&self, id: &str, success: bool, latency_ms: u64) {
        let mut nodes = self.nodes.write();
        let Some(node) = nodes.get_mut(id) else {
            return;
        };
        if success {
            node.stats.success_count += 1;
            node.stats.total_latency_ms += latency_ms;
        } else {
            node.stats.failure_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_roundtrip() {
        let registry = NodeRegistry::new();
        registry.add("n1", "http://n1:9200", 1.5).unwrap();
        let node = registry.get("n1").unwrap();
        assert_eq!(node.locator, "http://n1:9200");
        assert_eq!(node.weight, 1.5);
        assert!(node.active);
    }

    #[test]
    fn duplicate_add_rejected() {
        let registry = NodeRegistry::new();
        registry.add("n1", "a", 1.0).unwrap();
        assert!(matches!(
            registry.add("n1", "b", 1.0),
            Err(CoordinatorError::AlreadyExists { .. })
        ));
        // Original entry untouched.
        assert_eq!(registry.get("n1").unwrap().locator, "a");
    }

    #[test]
    fn remove_unknown_rejected() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.remove("ghost"),
            Err(CoordinatorError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn batch_stops_at_first_error_keeping_earlier_adds() {
        let registry = NodeRegistry::new();
        registry.add("n2", "x", 1.0).unwrap();
        let result = registry.add_batch(vec![
            ("n1", "a", 1.0),
            ("n2", "dup", 1.0),
            ("n3", "c", 1.0),
        ]);
        assert!(matches!(
            result,
            Err(CoordinatorError::AlreadyExists { .. })
        ));
        assert!(registry.get("n1").is_ok());
        assert!(registry.get("n3").is_err());
    }

    #[test]
    fn snapshots_are_id_ordered_and_filtered() {
        let registry = NodeRegistry::new();
        registry.add("nb", "b", 1.0).unwrap();
        registry.add("na", "a", 1.0).unwrap();
        registry.add("nc", "c", 1.0).unwrap();
        registry.set_active("nb", false).unwrap();

        let active: Vec<_> = registry
            .snapshot_active()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(active, vec!["na", "nc"]);
        assert_eq!(registry.snapshot_all().len(), 3);
        assert_eq!(registry.counts(), (3, 2));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let registry = NodeRegistry::new();
        registry.add("n1", "a", 1.0).unwrap();
        let snapshot = registry.snapshot_active();
        registry.remove("n1").unwrap();
        // The snapshot still holds the node it saw.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.counts(), (0, 0));
    }

    #[test]
    fn healthy_probe_reactivates_deactivated_node() {
        let registry = NodeRegistry::new();
        registry.add("n1", "a", 1.0).unwrap();
        registry.set_active("n1", false).unwrap();
        registry.record_probe("n1", ProbeOutcome::Healthy { latency_ms: 8 });
        let node = registry.get("n1").unwrap();
        assert!(node.active);
        assert_eq!(node.stats.success_count, 1);
        assert_eq!(node.stats.total_latency_ms, 8);
        assert!(node.stats.last_checked.is_some());
    }

    #[test]
    fn unhealthy_probe_deactivates() {
        let registry = NodeRegistry::new();
        registry.add("n1", "a", 1.0).unwrap();
        registry.record_probe(
            "n1",
            ProbeOutcome::Unhealthy {
                reason: "timed out".into(),
            },
        );
        let node = registry.get("n1").unwrap();
        assert!(!node.active);
        assert_eq!(node.stats.failure_count, 1);
    }

    #[test]
    fn probe_for_removed_node_is_noop() {
        let registry = NodeRegistry::new();
        registry.record_probe("gone", ProbeOutcome::Healthy { latency_ms: 1 });
        registry.record_search_result("gone", true, 1);
        assert_eq!(registry.counts(), (0, 0));
    }

    #[test]
    fn search_failures_do_not_deactivate() {
        let registry = NodeRegistry::new();
        registry.add("n1", "a", 1.0).unwrap();
        registry.record_search_result("n1", false, 0);
        let node = registry.get("n1").unwrap();
        assert!(node.active);
        assert_eq!(node.stats.failure_count, 1);
    }
}
