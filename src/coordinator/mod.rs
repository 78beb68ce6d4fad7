//! Search orchestration: lifecycle, administration, and scatter-gather.
//!
//! One [`SearchCoordinator`] owns a node registry, a stats registry, a load
//! balancer, and the background health monitor. A search takes a registry
//! snapshot, orders it through the balancer, fans one bounded call out per
//! node, joins every call (fan-in, not first-wins), and merges whatever came
//! back. A node failing never aborts the others; its reason travels in the
//! aggregate as data.

pub mod merge;
pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::SearchBackend;
use crate::cluster::balance::Balancer;
use crate::cluster::health::HealthMonitor;
use crate::cluster::node::NodeStats;
use crate::cluster::registry::NodeRegistry;
use crate::config::{CoordinatorConfig, SharedConfig};
use crate::error::{CoordinatorError, CoordinatorResult, NodeError};
use crate::model::{AggregateResult, ClusterStats, NodeResponse, SearchReply, StatsSnapshot};

pub use merge::MergeStrategy;
pub use stats::StatsRegistry;

/// Default page size for [`SearchCoordinator::simple_search`].
pub const DEFAULT_LIMIT: usize = 10;

/// Coordinates one cluster of search nodes behind a single search API.
///
/// Generic over the [`SearchBackend`] that executes the actual per-node
/// calls; every instance owns its registry, so multiple coordinators coexist
/// freely (there is no process-global state).
pub struct SearchCoordinator<B: SearchBackend> {
    backend: Arc<B>,
    registry: Arc<NodeRegistry>,
    balancer: Balancer,
    stats: Arc<StatsRegistry>,
    config: SharedConfig,
    monitor: Mutex<Option<HealthMonitor>>,
    stopped: AtomicBool,
}

impl<B: SearchBackend> SearchCoordinator<B> {
    /// Validate the config, build the registries, and spawn the health
    /// monitor. Must be called from within a Tokio runtime.
    pub fn start(config: CoordinatorConfig, backend: B) -> CoordinatorResult<Self> {
        config.validate()?;
        let backend = Arc::new(backend);
        let registry = Arc::new(NodeRegistry::new());
        let config = SharedConfig::new(config);
        let monitor = HealthMonitor::spawn(
            Arc::clone(&registry),
            Arc::clone(&backend),
            config.clone(),
        );
        info!("coordinator started");
        Ok(Self {
            backend,
            registry,
            balancer: Balancer::new(),
            stats: Arc::new(StatsRegistry::new()),
            config,
            monitor: Mutex::new(Some(monitor)),
            stopped: AtomicBool::new(false),
        })
    }

    /// Cancel and join the health monitor, then release every node handle.
    /// Idempotent; searches after this return [`CoordinatorError::NotRunning`].
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }
        self.registry.clear();
        info!("coordinator stopped");
    }

    /// Whether the coordinator (and its health monitor) is alive.
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
            && self
                .monitor
                .lock()
                .as_ref()
                .map(HealthMonitor::is_running)
                .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Administrative API
    // ------------------------------------------------------------------

    pub fn add_node(
        &self,
        id: impl Into<String>,
        locator: impl Into<String>,
        weight: f64,
    ) -> CoordinatorResult<()> {
        self.registry.add(id, locator, weight)
    }

    /// Batch registration; each add is atomic, the batch is not (the first
    /// failure aborts the remainder and is returned).
    pub fn add_nodes<I, S, L>(&self, batch: I) -> CoordinatorResult<()>
    where
        I: IntoIterator<Item = (S, L, f64)>,
        S: Into<String>,
        L: Into<String>,
    {
        self.registry.add_batch(batch)
    }

    pub fn remove_node(&self, id: &str) -> CoordinatorResult<()> {
        self.registry.remove(id)
    }

    /// Explicitly (de)activate a node. Deactivation wins over probes until
    /// the next successful probe reactivates the node.
    pub fn set_node_status(&self, id: &str, active: bool) -> CoordinatorResult<()> {
        self.registry.set_active(id, active)
    }

    /// Validate and atomically swap the whole config. On rejection the
    /// previous config stays in effect; in-flight searches keep the value
    /// they read at dispatch either way.
    pub fn configure(&self, config: CoordinatorConfig) -> CoordinatorResult<()> {
        config.validate()?;
        self.config.store(config);
        Ok(())
    }

    /// The config searches dispatched right now would use.
    pub fn config(&self) -> Arc<CoordinatorConfig> {
        self.config.load()
    }

    pub fn active_nodes(&self) -> Vec<String> {
        self.registry.active_ids()
    }

    pub fn node_stats(&self, id: &str) -> CoordinatorResult<NodeStats> {
        self.registry.stats(id)
    }

    pub fn search_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cluster_stats(&self) -> ClusterStats {
        let (total, active) = self.registry.counts();
        ClusterStats {
            total_nodes: total,
            active_nodes: active,
            inactive_nodes: total - active,
            config: (*self.config.load()).clone(),
            search: self.stats.snapshot(),
        }
    }

    // ------------------------------------------------------------------
    // Search API
    // ------------------------------------------------------------------

    /// Search with the default page (`limit = 10`, `offset = 0`).
    pub async fn simple_search(&self, query: &str) -> CoordinatorResult<AggregateResult> {
        self.search(query, DEFAULT_LIMIT, 0).await
    }

    /// One logical search across the cluster.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> CoordinatorResult<AggregateResult> {
        self.search_with_cancel(query, limit, offset, CancellationToken::new())
            .await
    }

    /// Like [`search`](Self::search), with a caller-supplied cancellation
    /// signal. On cancellation, per-node calls still pending resolve to
    /// `cancelled` errors and whatever already completed is merged; stats are
    /// recorded exactly once either way.
    pub async fn search_with_cancel(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
        cancel: CancellationToken,
    ) -> CoordinatorResult<AggregateResult> {
        let started = Instant::now();
        let result = self.dispatch(query, limit, offset, cancel).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        self.stats.record(result.is_ok(), latency_ms);
        match &result {
            Ok(aggregate) => info!(
                nodes = aggregate.node_responses.len(),
                failed = aggregate.errors.len(),
                total_hits = aggregate.total_hits,
                took_ms = aggregate.took_ms,
                latency_ms,
                "search complete"
            ),
            Err(error) => warn!(%error, latency_ms, "search failed"),
        }
        result
    }

    async fn dispatch(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
        cancel: CancellationToken,
    ) -> CoordinatorResult<AggregateResult> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CoordinatorError::NotRunning);
        }

        // The snapshot and config are fixed for the whole call: concurrent
        // admin traffic affects later searches, never this one.
        let cfg = self.config.load();
        let selected = self
            .balancer
            .select(self.registry.snapshot_active(), cfg.load_balancing);
        if selected.is_empty() {
            return Err(CoordinatorError::NoActiveNodes);
        }

        // Over-fetch so post-merge pagination has enough to slice from.
        let per_node_limit = limit + offset;

        let mut join = JoinSet::new();
        for node in &selected {
            self.balancer.begin(&node.id);
            let backend = Arc::clone(&self.backend);
            let cancel = cancel.clone();
            let query = query.to_string();
            let id = node.id.clone();
            let locator = node.locator.clone();
            let timeout_ms = cfg.timeout_ms;
            let max_retries = cfg.max_retries;
            join.spawn(async move {
                let outcome = call_node(
                    backend.as_ref(),
                    &locator,
                    &query,
                    per_node_limit,
                    timeout_ms,
                    max_retries,
                    &cancel,
                )
                .await;
                (id, outcome)
            });
        }

        // Fan-in: every dispatched call is joined, success or not.
        let mut outcomes: HashMap<String, CallOutcome> = HashMap::new();
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok((id, outcome)) => {
                    outcomes.insert(id, outcome);
                }
                Err(error) => warn!(%error, "search task aborted"),
            }
        }
        for node in &selected {
            self.balancer.finish(&node.id);
        }

        let mut responses = Vec::with_capacity(selected.len());
        for node in &selected {
            let response = match outcomes.remove(&node.id) {
                Some(Ok((reply, latency_ms))) => {
                    self.registry.record_search_result(&node.id, true, latency_ms);
                    NodeResponse::success(&node.id, reply)
                }
                Some(Err((error, elapsed_ms))) => {
                    self.registry.record_search_result(&node.id, false, 0);
                    warn!(node_id = %node.id, %error, "node search failed");
                    NodeResponse::failure(&node.id, error.to_string(), elapsed_ms)
                }
                // Task panicked; treat like any other node failure.
                None => {
                    self.registry.record_search_result(&node.id, false, 0);
                    NodeResponse::failure(&node.id, "search task aborted", 0)
                }
            };
            responses.push(response);
        }

        if responses.iter().all(|r| !r.is_success()) {
            let errors = responses
                .iter()
                .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.node_id)))
                .collect();
            return Err(CoordinatorError::AllNodesFailed { errors });
        }

        Ok(merge::merge(responses, cfg.merge_strategy, limit, offset))
    }
}

type CallOutcome = Result<(SearchReply, u64), (NodeError, u64)>;

/// One node's call: per-attempt timeout, transient-failure retries (each
/// attempt independently timed), cooperative cancellation. The returned
/// milliseconds span all attempts.
async fn call_node<B: SearchBackend>(
    backend: &B,
    locator: &str,
    query: &str,
    limit: usize,
    timeout_ms: u64,
    max_retries: u32,
    cancel: &CancellationToken,
) -> CallOutcome {
    let started = Instant::now();
    let budget = Duration::from_millis(timeout_ms);
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err((NodeError::Cancelled, started.elapsed().as_millis() as u64));
        }
        let call = backend.search(locator, query, limit, 0);
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err((NodeError::Cancelled, started.elapsed().as_millis() as u64));
            }
            r = tokio::time::timeout(budget, call) => r,
        };
        let error = match result {
            Ok(Ok(reply)) => return Ok((reply, started.elapsed().as_millis() as u64)),
            Ok(Err(error)) => error,
            Err(_) => NodeError::Timeout(timeout_ms),
        };
        if error.is_transient() && attempt < max_retries {
            attempt += 1;
            debug!(attempt, %error, "retrying node call");
            continue;
        }
        return Err((error, started.elapsed().as_millis() as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hit;
    use std::sync::atomic::AtomicU64;

    /// Minimal backend: every locator answers with one fixed hit.
    struct StaticBackend {
        calls: AtomicU64,
    }

    impl StaticBackend {
        fn new() -> Self {
            Self {
                calls: AtomicU64::new(0),
            }
        }
    }

    impl SearchBackend for StaticBackend {
        async fn search(
            &self,
            _locator: &str,
            _query: &str,
            _limit: usize,
            _offset: usize,
        ) -> Result<SearchReply, NodeError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(SearchReply {
                hits: vec![Hit::new(1.0)],
                total_hits: 1,
                took_ms: 1,
            })
        }
    }

    fn quiet_config() -> CoordinatorConfig {
        // Interval long enough that no probe fires during a test.
        CoordinatorConfig {
            health_check_interval_ms: 60_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_rejects_invalid_config() {
        let config = CoordinatorConfig {
            timeout_ms: 0,
            ..quiet_config()
        };
        assert!(SearchCoordinator::start(config, StaticBackend::new()).is_err());
    }

    #[tokio::test]
    async fn empty_registry_fails_fast() {
        let coordinator =
            SearchCoordinator::start(quiet_config(), StaticBackend::new()).unwrap();
        let err = coordinator.search("q", 10, 0).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NoActiveNodes));
        // The failed call still shows up in the stats.
        assert_eq!(coordinator.search_stats().failed_searches, 1);
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn configure_rejection_keeps_previous_config() {
        let coordinator =
            SearchCoordinator::start(quiet_config(), StaticBackend::new()).unwrap();
        let bad = CoordinatorConfig {
            timeout_ms: 0,
            ..quiet_config()
        };
        assert!(coordinator.configure(bad).is_err());
        assert_eq!(coordinator.config().timeout_ms, quiet_config().timeout_ms);
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_stops_searches() {
        let coordinator =
            SearchCoordinator::start(quiet_config(), StaticBackend::new()).unwrap();
        coordinator.add_node("n1", "loc", 1.0).unwrap();
        assert!(coordinator.is_running());
        coordinator.shutdown().await;
        coordinator.shutdown().await;
        assert!(!coordinator.is_running());
        assert!(matches!(
            coordinator.search("q", 10, 0).await.unwrap_err(),
            CoordinatorError::NotRunning
        ));
        // Node handles were released.
        assert!(coordinator.active_nodes().is_empty());
    }
}
