//! Wire-facing data model for searches and monitoring.
//!
//! Everything here is immutable once built and serde-serializable so the
//! binary (and any embedding caller) can emit it as JSON directly.

use serde::{Deserialize, Serialize};

use crate::config::CoordinatorConfig;

/// One scored document from a node's result set.
///
/// The document body is opaque to the coordinator: an arbitrary field map as
/// returned by the backend. `node_id` is stamped by the coordinator after the
/// call returns — backends leave it empty — and feeds tie-breaking and
/// debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    /// Relevance score assigned by the originating node.
    pub score: f64,

    /// Id of the node this hit came from.
    #[serde(default)]
    pub node_id: String,

    /// Opaque document fields.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Hit {
    /// Create a hit with a bare score and no fields.
    pub fn new(score: f64) -> Self {
        Self {
            score,
            node_id: String::new(),
            fields: serde_json::Map::new(),
        }
    }

    /// Attach a document field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// What a search backend returns for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReply {
    /// Returned page of hits, in the node's own ranking order.
    pub hits: Vec<Hit>,

    /// Total matches on that node, which may exceed `hits.len()`.
    pub total_hits: u64,

    /// Node-reported execution time in milliseconds.
    pub took_ms: u64,
}

/// Outcome of one node's participation in one search.
///
/// Exactly one of these exists per selected node per search. A failed node
/// has `error` populated, zero hits, and is excluded from `total_hits`
/// summation by the merger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResponse {
    pub node_id: String,
    pub total_hits: u64,
    pub hits: Vec<Hit>,
    pub took_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeResponse {
    /// Build a successful response, stamping `node_id` into every hit.
    pub fn success(node_id: impl Into<String>, mut reply: SearchReply) -> Self {
        let node_id = node_id.into();
        for hit in &mut reply.hits {
            hit.node_id = node_id.clone();
        }
        Self {
            node_id,
            total_hits: reply.total_hits,
            hits: reply.hits,
            took_ms: reply.took_ms,
            error: None,
        }
    }

    /// Build a failed response carrying the failure reason.
    pub fn failure(node_id: impl Into<String>, error: impl Into<String>, took_ms: u64) -> Self {
        Self {
            node_id: node_id.into(),
            total_hits: 0,
            hits: Vec::new(),
            took_ms,
            error: Some(error.into()),
        }
    }

    /// Whether this node answered successfully.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The externally visible answer for one search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Sum of `total_hits` over successful nodes (not the page length).
    pub total_hits: u64,

    /// Merged, paginated hits.
    pub hits: Vec<Hit>,

    /// Slowest participating node's `took_ms`; the fan-in is bounded by it.
    pub took_ms: u64,

    /// One entry per selected node, success or failure, in selection order.
    pub node_responses: Vec<NodeResponse>,

    /// Human-readable failure reasons, one per failed node, `"id: reason"`.
    pub errors: Vec<String>,
}

/// Point-in-time copy of the process-wide search counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub total_searches: u64,
    pub successful_searches: u64,
    pub failed_searches: u64,
    /// Running mean of search latency in milliseconds.
    pub average_response_time_ms: f64,
}

/// Cluster-wide view returned by the administrative API.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStats {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub inactive_nodes: usize,
    pub config: CoordinatorConfig,
    pub search: StatsSnapshot,
}
