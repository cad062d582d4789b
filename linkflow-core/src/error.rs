//! Error types for the dataflow engine.

use thiserror::Error;

use crate::node::InstanceId;

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while defining, wiring or running a graph.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The id does not name an instance of this engine.
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),

    /// The node type does not declare this input.
    #[error("node type '{node_type}' has no input '{key}'")]
    UnknownInput { node_type: String, key: String },

    /// The node type does not declare this output.
    #[error("node type '{node_type}' has no output '{key}'")]
    UnknownOutput { node_type: String, key: String },

    /// The node type does not declare this method.
    #[error("node type '{node_type}' has no method '{name}'")]
    UnknownMethod { node_type: String, name: String },

    /// An instance cannot feed one of its own inputs.
    #[error("cannot link instance {0} to itself")]
    SelfLink(InstanceId),

    /// A custom method shadows an engine operation.
    #[error("method name '{0}' is reserved by the engine")]
    ReservedMethod(String),

    /// A key was declared twice on the same node type.
    #[error("node type '{node_type}' declares '{key}' twice")]
    DuplicateKey { node_type: String, key: String },

    /// Resolve read an input that currently holds no value.
    #[error("input '{0}' has no value")]
    MissingInput(String),

    /// An input holds a value of an unexpected shape.
    #[error("input '{key}': expected {expected}")]
    InputType { key: String, expected: &'static str },

    /// The instance state is not of the requested type.
    #[error("instance state is not a {0}")]
    StateType(&'static str),

    /// A single flush executed more instances than the configured limit.
    #[error("flush exceeded the limit of {limit} executions")]
    FlushLimitExceeded { limit: usize },

    /// Engine configuration could not be parsed.
    #[error("invalid engine configuration: {0}")]
    Config(String),

    /// Engine bookkeeping is corrupt. Always a bug.
    #[error("engine invariant violated: {0}")]
    Invariant(String),
}

impl EngineError {
    /// Build an invariant violation and report it loudly.
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(%msg, "engine invariant violated");
        Self::Invariant(msg)
    }

    /// Whether this error signals corrupted engine state rather than misuse.
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}
