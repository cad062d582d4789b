//! Linkflow Core
//!
//! This crate provides the runtime for Linkflow, an incremental dataflow
//! engine. Computations are node types with named inputs and outputs;
//! instances of them are wired output-to-input into a graph, and a change to
//! any input re-runs exactly the instances affected by it.
//!
//! It implements:
//!
//! - Node types with required, defaulted and pulse inputs
//! - Linking and unlinking at runtime, cycles included
//! - Liveness tracking: instances with unsatisfied inputs do not run
//! - Dependency-ordered flushes where each instance runs at most once
//! - Deferred writes applied in later turns
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `node`: Node types, instances and their input/output declarations
//! - `engine`: The engine context, scheduler and resolve context
//! - `graph`: Linking, liveness and dependency bookkeeping
//! - `store`: Per-instance values and state
//! - `config`: Engine limits
//!
//! # Example
//!
//! ```rust,ignore
//! use linkflow_core::{Engine, NodeType};
//! use serde_json::json;
//!
//! let times_five = NodeType::builder("TimesFive")
//!     .required_input("value")
//!     .resolve(|ctx| {
//!         let value = ctx.input_i64("value")?;
//!         ctx.emit(json!(value * 5))
//!     })
//!     .build()?;
//!
//! let mut engine = Engine::new();
//! let a = engine.instantiate(&times_five, &[])?;
//! let b = engine.instantiate(&times_five, &[])?;
//! engine.link(a, "value", b, "value")?;
//!
//! // Both instances run, in dependency order
//! engine.set_input(a, "value", json!(2))?;
//! assert_eq!(engine.output_value(b, "value")?, Some(&json!(50)));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod node;
pub mod store;

pub use config::EngineConfig;
pub use engine::{Engine, InstanceSnapshot, Resolve};
pub use error::{EngineError, Result};
pub use node::{InputSpec, Instance, InstanceId, NodeType, NodeTypeBuilder, OutputKind};
pub use store::{InstanceState, Value};
