//! Engine-level error types.

use thiserror::Error;

/// Structural errors that fail a whole run.
///
/// Node-level failures never show up here: they are stored as that node's
/// `{"error": ..}` result and the run carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ------ Graph errors ------

    /// Every node has an incoming edge, so there is nowhere to start.
    #[error("no entry nodes found: every node has an incoming edge")]
    NoEntryNodes,

    /// A node was reached again while its own downstream walk was still in
    /// progress, or a topological sort could not place it.
    #[error("cycle detected at node '{node_id}'")]
    CycleDetected { node_id: String },

    /// Reachable nodes that could never become ready (their upstreams form a
    /// cycle).
    #[error("workflow stalled with unfinished nodes: {}", pending.join(", "))]
    Stalled { pending: Vec<String> },

    // ------ Execution errors ------

    /// A second result was written for a node id.
    #[error("result for node '{0}' was already recorded")]
    DuplicateResult(String),

    /// The task scheduler itself failed (not a node).
    #[error("scheduler failure: {0}")]
    Scheduler(String),
}
