//! Node-level error type.

use serde_json::{json, Value};
use thiserror::Error;

use crate::expr::ExprError;

/// Errors returned by a node's `execute` method.
///
/// None of these abort a run: the engine stores the rendered message as the
/// node's result (`{"error": "<message>"}`) and keeps walking the graph.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// A config field is missing, mistyped, or out of range.
    #[error("invalid config field '{field}': {message}")]
    InvalidConfig {
        field: &'static str,
        message: String,
    },

    /// The node asked for a sub-option the handler does not implement
    /// (an HTTP method, a code language, ...).
    #[error("{0}")]
    Unsupported(String),

    /// Compiling or evaluating a sandboxed expression failed.
    #[error("{0}")]
    Expression(#[from] ExprError),

    /// Transport-level HTTP failure.
    #[error("http request failed: {0}")]
    Http(String),

    /// Anything else a handler wants to report.
    #[error("{0}")]
    Failed(String),
}

impl NodeError {
    /// Render the error as the payload stored in the result map.
    pub fn into_payload(self) -> Value {
        error_payload(self.to_string())
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(err: reqwest::Error) -> Self {
        NodeError::Http(err.to_string())
    }
}

/// The `{"error": message}` marker used for every failed node.
pub fn error_payload(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}
