//! Node Types and Instances
//!
//! A [`NodeType`] declares what a node reads, what it writes and how it
//! computes. [`Engine::instantiate`](crate::Engine::instantiate) turns a type
//! into an [`Instance`], a vertex of the dataflow graph.
//!
//! Inputs come in three flavours:
//!
//! - **Default**: starts with a value and never blocks.
//! - **Required**: starts absent; the instance does not run until the input
//!   is fed by a live producer or set directly.
//! - **Pulse**: an edge-triggered boolean, `true` for exactly one execution.

mod instance;
mod node_type;
mod spec;

pub use instance::{Instance, InstanceId, LinkSource, LinkTarget, LinkTargets};
pub use node_type::{
    MethodFn, NodeType, NodeTypeBuilder, ResolveFn, StateFactory, StateInit, RESERVED_METHODS,
};
pub use spec::{InputSpec, OutputKind, DEFAULT_OUTPUT};
