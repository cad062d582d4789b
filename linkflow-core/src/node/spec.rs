//! Input and output declarations of a node type.

use serde_json::Value;

/// How an input key behaves.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
    /// Starts with the given value. Never blocks the instance.
    Default(Value),

    /// Starts absent. The instance is blocked until the key is fed by a
    /// live producer or set directly.
    Required,

    /// Edge-triggered boolean. Starts `false` and is reset to `false` after
    /// every execution.
    Pulse,
}

impl InputSpec {
    /// The value an instance starts with (and returns to on unlink).
    pub fn default_value(&self) -> Option<Value> {
        match self {
            Self::Default(value) => Some(value.clone()),
            Self::Required => None,
            Self::Pulse => Some(Value::Bool(false)),
        }
    }

    /// Whether this is a required key.
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required)
    }

    /// Whether this is a pulse key.
    pub fn is_pulse(&self) -> bool {
        matches!(self, Self::Pulse)
    }
}

impl From<Value> for InputSpec {
    fn from(value: Value) -> Self {
        Self::Default(value)
    }
}

/// How an output key delivers its values downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Level-triggered: only delivered when the target's input changes.
    Value,

    /// Edge-triggered: every truthy write is delivered as `true`, and the
    /// output itself reads back as `false`.
    Pulse,
}

/// Name of the output a type gets when it declares none.
pub const DEFAULT_OUTPUT: &str = "value";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_values() {
        assert_eq!(InputSpec::Default(json!(3)).default_value(), Some(json!(3)));
        assert_eq!(InputSpec::Required.default_value(), None);
        assert_eq!(InputSpec::Pulse.default_value(), Some(json!(false)));
    }

    #[test]
    fn values_convert_to_defaults() {
        let spec: InputSpec = json!("x").into();
        assert_eq!(spec, InputSpec::Default(json!("x")));
        assert!(!spec.is_required());
        assert!(!spec.is_pulse());
    }
}
