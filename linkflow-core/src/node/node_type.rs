//! Node Types
//!
//! A node type is the immutable blueprint shared by all of its instances: the
//! declared inputs and outputs, the resolve function, the state initializer
//! and any extra named methods.
//!
//! Types are built with [`NodeTypeBuilder`] and shared as `Arc<NodeType>`.
//!
//! ```rust,ignore
//! let times_five = NodeType::builder("TimesFive")
//!     .required_input("value")
//!     .resolve(|ctx| {
//!         let value = ctx.input_i64("value")?;
//!         ctx.emit(json!(value * 5))
//!     })
//!     .build()?;
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use super::spec::{InputSpec, OutputKind, DEFAULT_OUTPUT};
use super::InstanceId;
use crate::engine::{Engine, Resolve};
use crate::error::{EngineError, Result};
use crate::store::{is_truthy, InstanceState};

/// The computation run when an instance executes.
pub type ResolveFn = Arc<dyn Fn(&mut Resolve<'_>) -> Result<()> + Send + Sync>;

/// An extra operation callable on instances through [`Engine::call`].
pub type MethodFn = Arc<dyn Fn(&mut Engine, InstanceId, &[Value]) -> Result<Value> + Send + Sync>;

/// Builds per-instance state from constructor arguments.
pub type StateFactory = Arc<dyn Fn(&[Value]) -> InstanceState + Send + Sync>;

/// Method names that would shadow engine operations.
pub const RESERVED_METHODS: &[&str] = &[
    "call",
    "input_value",
    "instantiate",
    "is_running",
    "link",
    "output",
    "output_value",
    "resolve",
    "set_input",
    "set_input_values",
    "unlink",
];

/// How each instance gets its initial state.
#[derive(Clone)]
pub enum StateInit {
    /// Every instance starts from a clone of this value.
    Default(InstanceState),

    /// Every instance gets the result of this factory.
    Factory(StateFactory),
}

impl StateInit {
    fn create(&self, args: &[Value]) -> InstanceState {
        match self {
            Self::Default(state) => state.clone(),
            Self::Factory(factory) => factory(args),
        }
    }
}

impl Default for StateInit {
    fn default() -> Self {
        Self::Default(InstanceState::default())
    }
}

/// Immutable blueprint for node instances.
pub struct NodeType {
    name: String,
    inputs: IndexMap<String, InputSpec>,
    outputs: IndexMap<String, OutputKind>,
    resolve: ResolveFn,
    state: StateInit,
    methods: IndexMap<String, MethodFn>,
    required_count: usize,
}

impl NodeType {
    /// Start building a node type.
    pub fn builder(name: impl Into<String>) -> NodeTypeBuilder {
        NodeTypeBuilder::new(name)
    }

    /// Diagnostic name of the type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared inputs in declaration order.
    pub fn inputs(&self) -> &IndexMap<String, InputSpec> {
        &self.inputs
    }

    /// Declared outputs in declaration order.
    pub fn outputs(&self) -> &IndexMap<String, OutputKind> {
        &self.outputs
    }

    /// Spec of an input key.
    pub fn input_spec(&self, key: &str) -> Option<&InputSpec> {
        self.inputs.get(key)
    }

    /// Kind of an output key.
    pub fn output_kind(&self, key: &str) -> Option<OutputKind> {
        self.outputs.get(key).copied()
    }

    /// Whether the type declares this input.
    pub fn defines_input(&self, key: &str) -> bool {
        self.inputs.contains_key(key)
    }

    /// Whether the type declares this output.
    pub fn defines_output(&self, key: &str) -> bool {
        self.outputs.contains_key(key)
    }

    /// Whether the input key is declared required.
    pub fn is_required_input(&self, key: &str) -> bool {
        self.inputs.get(key).is_some_and(InputSpec::is_required)
    }

    /// Number of required inputs.
    pub fn required_count(&self) -> usize {
        self.required_count
    }

    /// Pulse input keys.
    pub fn pulse_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .filter(|(_, spec)| spec.is_pulse())
            .map(|(key, _)| key.as_str())
    }

    /// Default value of an input, `None` for required or undeclared keys.
    pub fn default_input(&self, key: &str) -> Option<Value> {
        self.inputs.get(key).and_then(InputSpec::default_value)
    }

    /// A fresh copy of every default input.
    pub fn default_inputs(&self) -> IndexMap<String, Option<Value>> {
        self.inputs
            .iter()
            .map(|(key, spec)| (key.clone(), spec.default_value()))
            .collect()
    }

    /// Initial state for a new instance.
    pub fn init_state(&self, args: &[Value]) -> InstanceState {
        self.state.create(args)
    }

    /// The resolve function.
    pub fn resolver(&self) -> &ResolveFn {
        &self.resolve
    }

    /// Look up an extra method.
    pub fn method(&self, name: &str) -> Option<&MethodFn> {
        self.methods.get(name)
    }

    /// The value actually stored when `value` is written to input `key`.
    /// Pulse inputs only ever hold a boolean.
    pub(crate) fn normalize_input(&self, key: &str, value: Option<Value>) -> Option<Value> {
        match self.input_spec(key) {
            Some(InputSpec::Pulse) => Some(Value::Bool(value.as_ref().is_some_and(is_truthy))),
            _ => value,
        }
    }

    pub(crate) fn unknown_input(&self, key: &str) -> EngineError {
        EngineError::UnknownInput {
            node_type: self.name.clone(),
            key: key.to_owned(),
        }
    }

    pub(crate) fn unknown_output(&self, key: &str) -> EngineError {
        EngineError::UnknownOutput {
            node_type: self.name.clone(),
            key: key.to_owned(),
        }
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`NodeType`].
///
/// Declaration errors are remembered and reported by [`build`](Self::build),
/// so the builder can be chained freely.
pub struct NodeTypeBuilder {
    name: String,
    inputs: IndexMap<String, InputSpec>,
    outputs: IndexMap<String, OutputKind>,
    resolve: Option<ResolveFn>,
    state: StateInit,
    methods: IndexMap<String, MethodFn>,
    error: Option<EngineError>,
}

impl NodeTypeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            resolve: None,
            state: StateInit::default(),
            methods: IndexMap::new(),
            error: None,
        }
    }

    /// Declare an input.
    pub fn input(mut self, key: impl Into<String>, spec: impl Into<InputSpec>) -> Self {
        let key = key.into();
        if self.inputs.contains_key(&key) {
            self.fail_duplicate(key);
        } else {
            self.inputs.insert(key, spec.into());
        }
        self
    }

    /// Declare an input with a default value.
    pub fn default_input(self, key: impl Into<String>, value: Value) -> Self {
        self.input(key, InputSpec::Default(value))
    }

    /// Declare a required input.
    pub fn required_input(self, key: impl Into<String>) -> Self {
        self.input(key, InputSpec::Required)
    }

    /// Declare a pulse input.
    pub fn pulse_input(self, key: impl Into<String>) -> Self {
        self.input(key, InputSpec::Pulse)
    }

    /// Declare a level-triggered output.
    pub fn output(self, key: impl Into<String>) -> Self {
        self.declare_output(key.into(), OutputKind::Value)
    }

    /// Declare an edge-triggered output.
    pub fn pulse_output(self, key: impl Into<String>) -> Self {
        self.declare_output(key.into(), OutputKind::Pulse)
    }

    /// Every instance starts with a clone of `state`.
    pub fn state<T>(mut self, state: T) -> Self
    where
        T: Any + Clone + Send + Sync,
    {
        self.state = StateInit::Default(InstanceState::new(state));
        self
    }

    /// Every instance gets `factory(args)` where `args` are the constructor
    /// arguments given to [`Engine::instantiate`].
    pub fn state_with<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Clone + Send + Sync,
        F: Fn(&[Value]) -> T + Send + Sync + 'static,
    {
        self.state = StateInit::Factory(Arc::new(move |args: &[Value]| InstanceState::new(factory(args))));
        self
    }

    /// Set the resolve function.
    pub fn resolve<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&mut Resolve<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.resolve = Some(Arc::new(resolve));
        self
    }

    /// Declare an extra method, dispatched by [`Engine::call`].
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&mut Engine, InstanceId, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        if RESERVED_METHODS.contains(&name.as_str()) {
            self.fail(EngineError::ReservedMethod(name));
        } else if self.methods.contains_key(&name) {
            self.fail_duplicate(name);
        } else {
            self.methods.insert(name, Arc::new(method));
        }
        self
    }

    /// Finish the type.
    pub fn build(self) -> Result<Arc<NodeType>> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let mut outputs = self.outputs;
        if outputs.is_empty() {
            outputs.insert(DEFAULT_OUTPUT.to_owned(), OutputKind::Value);
        }

        let required_count = self.inputs.values().filter(|spec| spec.is_required()).count();
        let resolve: ResolveFn = match self.resolve {
            Some(resolve) => resolve,
            None => Arc::new(resolve_nothing),
        };

        Ok(Arc::new(NodeType {
            name: self.name,
            inputs: self.inputs,
            outputs,
            resolve,
            state: self.state,
            methods: self.methods,
            required_count,
        }))
    }

    fn declare_output(mut self, key: String, kind: OutputKind) -> Self {
        if self.outputs.contains_key(&key) {
            self.fail_duplicate(key);
        } else {
            self.outputs.insert(key, kind);
        }
        self
    }

    fn fail_duplicate(&mut self, key: String) {
        let err = EngineError::DuplicateKey {
            node_type: self.name.clone(),
            key,
        };
        self.fail(err);
    }

    fn fail(&mut self, err: EngineError) {
        // First error wins.
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

fn resolve_nothing(_: &mut Resolve<'_>) -> Result<()> {
    Ok(())
}
