//! Resolve context.
//!
//! A resolve function sees its instance through [`Resolve`]: the current
//! inputs, mutable access to its state, and a way to submit output writes.
//! Writes are applied by the engine once resolve returns.

use std::any::Any;

use indexmap::IndexMap;
use serde_json::Value;

use super::OutputWrites;
use crate::error::{EngineError, Result};
use crate::node::{InstanceId, NodeType, DEFAULT_OUTPUT};
use crate::store::{is_truthy, InstanceState};

/// The view a resolve function has of the instance being executed.
pub struct Resolve<'a> {
    id: InstanceId,
    node_type: &'a NodeType,
    inputs: &'a IndexMap<String, Option<Value>>,
    state: &'a mut InstanceState,
    writes: OutputWrites,
    deferred: OutputWrites,
}

impl<'a> Resolve<'a> {
    pub(crate) fn new(
        id: InstanceId,
        node_type: &'a NodeType,
        inputs: &'a IndexMap<String, Option<Value>>,
        state: &'a mut InstanceState,
    ) -> Self {
        Self {
            id,
            node_type,
            inputs,
            state,
            writes: OutputWrites::new(),
            deferred: OutputWrites::new(),
        }
    }

    /// The executing instance.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The executing instance's type.
    pub fn node_type(&self) -> &NodeType {
        self.node_type
    }

    /// Current value of an input. `None` if absent or undeclared.
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key).and_then(Option::as_ref)
    }

    /// Current value of an input, failing if it is absent.
    pub fn require(&self, key: &str) -> Result<&Value> {
        match self.inputs.get(key) {
            None => Err(self.node_type.unknown_input(key)),
            Some(None) => Err(EngineError::MissingInput(key.to_owned())),
            Some(Some(value)) => Ok(value),
        }
    }

    /// An input as an integer.
    pub fn input_i64(&self, key: &str) -> Result<i64> {
        self.require(key)?.as_i64().ok_or_else(|| EngineError::InputType {
            key: key.to_owned(),
            expected: "an integer",
        })
    }

    /// An input as a float. Integers are widened.
    pub fn input_f64(&self, key: &str) -> Result<f64> {
        self.require(key)?.as_f64().ok_or_else(|| EngineError::InputType {
            key: key.to_owned(),
            expected: "a number",
        })
    }

    /// Whether an input is truthy. Absent inputs are `false`.
    ///
    /// This is how pulse inputs are read.
    pub fn is_set(&self, key: &str) -> bool {
        self.input(key).is_some_and(is_truthy)
    }

    /// Borrow the instance state as `T`.
    pub fn state<T: Any>(&self) -> Result<&T> {
        self.state.get::<T>()
    }

    /// Mutably borrow the instance state as `T`.
    pub fn state_mut<T: Any>(&mut self) -> Result<&mut T> {
        self.state.get_mut::<T>()
    }

    /// Write an output.
    pub fn output(&mut self, key: &str, value: Value) -> Result<()> {
        self.check_output(key)?;
        self.writes.push((key.to_owned(), value));
        Ok(())
    }

    /// Write the implicit `"value"` output.
    pub fn emit(&mut self, value: Value) -> Result<()> {
        self.output(DEFAULT_OUTPUT, value)
    }

    /// Fire a pulse output.
    pub fn pulse(&mut self, key: &str) -> Result<()> {
        self.output(key, Value::Bool(true))
    }

    /// Write an output in a later turn instead of this flush.
    ///
    /// See [`Engine::run_deferred`](super::Engine::run_deferred).
    pub fn defer(&mut self, key: &str, value: Value) -> Result<()> {
        self.check_output(key)?;
        self.deferred.push((key.to_owned(), value));
        Ok(())
    }

    /// Fire a pulse output in a later turn.
    pub fn defer_pulse(&mut self, key: &str) -> Result<()> {
        self.defer(key, Value::Bool(true))
    }

    pub(crate) fn into_writes(self) -> (OutputWrites, OutputWrites) {
        (self.writes, self.deferred)
    }

    fn check_output(&self, key: &str) -> Result<()> {
        if self.node_type.defines_output(key) {
            Ok(())
        } else {
            Err(self.node_type.unknown_output(key))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_inputs_and_collects_writes() {
        let node_type = NodeType::builder("Sum")
            .required_input("a")
            .default_input("b", json!(2.5))
            .pulse_input("go")
            .output("sum")
            .pulse_output("done")
            .build()
            .unwrap();
        let mut inputs = node_type.default_inputs();
        inputs.insert("a".into(), Some(json!(4)));
        let mut state = InstanceState::new(0_u32);

        let mut ctx = Resolve::new(InstanceId::new(3), &node_type, &inputs, &mut state);
        assert_eq!(ctx.input_i64("a").unwrap(), 4);
        assert_eq!(ctx.input_f64("b").unwrap(), 2.5);
        assert!(!ctx.is_set("go"));
        assert!(matches!(ctx.input_i64("b"), Err(EngineError::InputType { .. })));
        assert!(matches!(ctx.require("nope"), Err(EngineError::UnknownInput { .. })));

        *ctx.state_mut::<u32>().unwrap() += 1;
        ctx.output("sum", json!(6.5)).unwrap();
        ctx.defer_pulse("done").unwrap();
        assert!(matches!(ctx.emit(json!(1)), Err(EngineError::UnknownOutput { .. })));

        let (writes, deferred) = ctx.into_writes();
        assert_eq!(writes.as_slice(), &[("sum".to_owned(), json!(6.5))]);
        assert_eq!(deferred.as_slice(), &[("done".to_owned(), json!(true))]);
        assert_eq!(*state.get::<u32>().unwrap(), 1);
    }

    #[test]
    fn missing_required_input() {
        let node_type = NodeType::builder("Req").required_input("a").build().unwrap();
        let inputs = node_type.default_inputs();
        let mut state = InstanceState::default();
        let ctx = Resolve::new(InstanceId::new(0), &node_type, &inputs, &mut state);

        assert!(matches!(ctx.require("a"), Err(EngineError::MissingInput(key)) if key == "a"));
        assert_eq!(ctx.input("a"), None);
    }
}
