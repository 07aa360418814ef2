//! `nodes` crate: the `ExecutableNode` trait and built-in node implementations.
//!
//! Every node, built-in or externally supplied, must implement
//! [`ExecutableNode`]. The engine crate dispatches execution through the
//! [`NodeRegistry`], which maps a [`NodeKind`] tag to a trait object and
//! routes unrecognised tags to a diagnostic fallback.

pub mod builtin;
pub mod definition;
pub mod error;
pub mod expr;
pub mod mock;
pub mod registry;
pub mod template;
pub mod traits;

pub use definition::{NodeDefinition, NodeKind};
pub use error::{error_payload, NodeError};
pub use registry::NodeRegistry;
pub use traits::{ExecutableNode, ExecutionContext, NodeInput};
