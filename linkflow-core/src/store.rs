//! Value Store
//!
//! Each instance keeps its current inputs, its last emitted outputs and an
//! arbitrary piece of user state. The store knows nothing about links or
//! scheduling; the engine decides when values change.
//!
//! # State
//!
//! User state is type-erased so that instances of different node types can
//! live in the same engine. Any `Clone + Send + Sync + 'static` type can be
//! used. Each instance starts from its own copy of the node type's default,
//! made with `Clone`.

use std::any::{type_name, Any};
use std::fmt;

use indexmap::IndexMap;

use crate::error::{EngineError, Result};

/// A value flowing through the graph.
pub use serde_json::Value;

/// Whether a value counts as "on" for pulse purposes.
///
/// Everything except `null` and `false` is truthy.
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// A piece of state that can be cloned behind a trait object.
pub trait StateValue: Any + Send + Sync {
    /// Clone into a fresh box.
    fn clone_state(&self) -> Box<dyn StateValue>;

    /// Upcast for downcasting by reference.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for downcasting by mutable reference.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> StateValue for T
where
    T: Any + Clone + Send + Sync,
{
    fn clone_state(&self) -> Box<dyn StateValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Instance-private user state.
pub struct InstanceState(Box<dyn StateValue>);

impl InstanceState {
    /// Wrap a concrete state value.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Clone + Send + Sync,
    {
        Self(Box::new(value))
    }

    /// Borrow the state as `T`.
    pub fn get<T: Any>(&self) -> Result<&T> {
        (*self.0)
            .as_any()
            .downcast_ref::<T>()
            .ok_or(EngineError::StateType(type_name::<T>()))
    }

    /// Mutably borrow the state as `T`.
    pub fn get_mut<T: Any>(&mut self) -> Result<&mut T> {
        (*self.0)
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(EngineError::StateType(type_name::<T>()))
    }
}

impl Clone for InstanceState {
    fn clone(&self) -> Self {
        Self((*self.0).clone_state())
    }
}

impl Default for InstanceState {
    fn default() -> Self {
        Self::new(())
    }
}

impl fmt::Debug for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InstanceState(..)")
    }
}

/// Current inputs, outputs and state of one instance.
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    /// Every declared input key. `None` means absent.
    inputs: IndexMap<String, Option<Value>>,

    /// Outputs written at least once.
    outputs: IndexMap<String, Value>,

    state: InstanceState,
}

impl ValueStore {
    /// Create a store from default inputs and an initial state.
    pub fn new(inputs: IndexMap<String, Option<Value>>, state: InstanceState) -> Self {
        Self {
            inputs,
            outputs: IndexMap::new(),
            state,
        }
    }

    /// Current value of an input. `None` if absent or undeclared.
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key).and_then(Option::as_ref)
    }

    /// All inputs in declaration order.
    pub fn inputs(&self) -> &IndexMap<String, Option<Value>> {
        &self.inputs
    }

    /// Replace an input value. Returns `true` if the stored value changed.
    ///
    /// Keys not declared on the store are ignored.
    pub fn set_input(&mut self, key: &str, value: Option<Value>) -> bool {
        match self.inputs.get_mut(key) {
            Some(slot) if *slot != value => {
                *slot = value;
                true
            }
            _ => false,
        }
    }

    /// Last recorded value of an output.
    pub fn output(&self, key: &str) -> Option<&Value> {
        self.outputs.get(key)
    }

    /// All recorded outputs.
    pub fn outputs(&self) -> &IndexMap<String, Value> {
        &self.outputs
    }

    /// Record an output value.
    pub fn record_output(&mut self, key: &str, value: Value) {
        self.outputs.insert(key.to_owned(), value);
    }

    /// The user state.
    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    /// Split borrow used while resolving: inputs read-only, state mutable.
    pub(crate) fn resolve_parts(&mut self) -> (&IndexMap<String, Option<Value>>, &mut InstanceState) {
        (&self.inputs, &mut self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        total: i64,
    }

    #[test]
    fn truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(0)));
        assert!(is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn state_downcasts_to_its_type() {
        let mut state = InstanceState::new(Counter { total: 1 });
        assert_eq!(state.get::<Counter>().unwrap().total, 1);

        state.get_mut::<Counter>().unwrap().total += 4;
        assert_eq!(state.get::<Counter>().unwrap().total, 5);

        assert!(matches!(state.get::<String>(), Err(EngineError::StateType(_))));
    }

    #[test]
    fn cloned_state_is_independent() {
        let original = InstanceState::new(Counter { total: 0 });
        let mut copy = original.clone();
        copy.get_mut::<Counter>().unwrap().total = 9;

        assert_eq!(original.get::<Counter>().unwrap().total, 0);
        assert_eq!(copy.get::<Counter>().unwrap().total, 9);
    }

    #[test]
    fn set_input_reports_changes() {
        let mut inputs = IndexMap::new();
        inputs.insert("a".to_owned(), None);
        let mut store = ValueStore::new(inputs, InstanceState::default());

        assert!(store.set_input("a", Some(json!(1))));
        assert!(!store.set_input("a", Some(json!(1))));
        assert!(store.set_input("a", None));
        assert!(!store.set_input("missing", Some(json!(1))));
        assert!(!store.inputs().contains_key("missing"));
    }
}
