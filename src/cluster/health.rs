//! Background health monitoring.
//!
//! One cancellable task probes every registered node (active or not) each
//! interval with a trivial query, flipping `active` through the registry:
//! a successful probe reactivates, a failed or timed-out probe deactivates.
//! Explicit `set_node_status` calls are never blocked — the loop holds no
//! registry lock while probing, only for the instant it applies an outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::{NodeRegistry, ProbeOutcome};
use crate::backend::SearchBackend;
use crate::config::SharedConfig;
use crate::error::NodeError;

/// Handle to the probe loop. Dropping it does NOT stop the task; call
/// [`HealthMonitor::shutdown`] to cancel and join.
pub struct HealthMonitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the probe loop on the current runtime.
    ///
    /// Interval and probe timeout are re-read from `config` every tick, so a
    /// `configure` call takes effect at the next tick without a restart.
    pub fn spawn<B: SearchBackend>(
        registry: Arc<NodeRegistry>,
        backend: Arc<B>,
        config: SharedConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run(registry, backend, config, loop_cancel).await;
        });
        Self { cancel, handle }
    }

    /// Whether the probe loop is still alive.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the loop and wait for it to exit. The cancellation is honored
    /// at the next tick boundary or mid-probe.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn run<B: SearchBackend>(
    registry: Arc<NodeRegistry>,
    backend: Arc<B>,
    config: SharedConfig,
    cancel: CancellationToken,
) {
    info!("health monitor started");
    loop {
        let cfg = config.load();
        let interval = Duration::from_millis(cfg.health_check_interval_ms);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        // Clone identities out; no lock is held across the probes.
        let nodes = registry.snapshot_all();
        debug!(nodes = nodes.len(), "probe round");
        for node in nodes {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = probe(backend.as_ref(), &node.locator, cfg.timeout_ms, &cancel).await;
            registry.record_probe(&node.id, outcome);
        }
        if cancel.is_cancelled() {
            break;
        }
    }
    info!("health monitor stopped");
}

/// Probe one node with the trivial query under the configured budget.
async fn probe<B: SearchBackend>(
    backend: &B,
    locator: &str,
    timeout_ms: u64,
    cancel: &CancellationToken,
) -> ProbeOutcome {
    let started = Instant::now();
    let call = backend.search(locator, "", 1, 0);
    let result = tokio::select! {
        _ = cancel.cancelled() => return ProbeOutcome::Unhealthy {
            reason: NodeError::Cancelled.to_string(),
        },
        r = tokio::time::timeout(Duration::from_millis(timeout_ms), call) => r,
    };
    match result {
        Ok(Ok(_)) => ProbeOutcome::Healthy {
            latency_ms: started.elapsed().as_millis() as u64,
        },
        Ok(Err(err)) => ProbeOutcome::Unhealthy {
            reason: err.to_string(),
        },
        Err(_) => ProbeOutcome::Unhealthy {
            reason: NodeError::Timeout(timeout_ms).to_string(),
        },
    }
}
