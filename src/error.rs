//! Error types for the search coordinator.
//!
//! Two layers: [`NodeError`] covers failures scoped to a single node's call
//! and is always contained (it becomes the `error` field of that node's
//! response, never an `Err` of the whole search). [`CoordinatorError`] covers
//! administrative failures and the two search-fatal cases (no nodes to query,
//! every queried node failed).

use thiserror::Error;

/// Failure of a single per-node call. Recorded in that node's
/// [`NodeResponse`](crate::model::NodeResponse); never aborts the search.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// The per-attempt budget elapsed before the node answered.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The call failed at the transport layer (connection refused, bad
    /// payload, remote 5xx, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller cancelled the search before this node answered.
    #[error("cancelled")]
    Cancelled,
}

impl NodeError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

/// Coordinator-level errors returned directly to the caller.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The load balancer selected zero nodes; nothing was dispatched.
    #[error("no active nodes")]
    NoActiveNodes,

    /// An administrative call referenced an unknown node id.
    #[error("node not found: {id}")]
    NodeNotFound { id: String },

    /// `add_node` was called with an id already present in the registry.
    #[error("node already exists: {id}")]
    AlreadyExists { id: String },

    /// `configure` rejected the new value; the previous config stays in
    /// effect.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Every selected node failed. The per-node reasons are keyed by id.
    #[error("all {} selected nodes failed: {}", .errors.len(), .errors.join("; "))]
    AllNodesFailed { errors: Vec<String> },

    /// The coordinator was shut down.
    #[error("coordinator is not running")]
    NotRunning,
}

/// Result alias used throughout the crate.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
