//! Pulse layer.
//!
//! Pulses are edge-triggered booleans layered over ordinary values. A pulse
//! output broadcasts `true` on every truthy write, even if it broadcast `true`
//! last time, and reads back as `false`. A pulse input is reset to `false`
//! after every execution.

use std::sync::Arc;

use serde_json::Value;

use crate::node::{Instance, OutputKind};
use crate::store::is_truthy;

/// How one output write is recorded and delivered.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Delivery {
    /// What the producer's output reads back as.
    pub recorded: Value,

    /// What linked inputs receive.
    pub broadcast: Value,

    /// Deliver even when the target input already holds `broadcast`.
    pub always: bool,
}

/// Classify a write to an output of the given kind.
pub(crate) fn deliver(kind: OutputKind, value: Value) -> Delivery {
    match kind {
        OutputKind::Pulse if is_truthy(&value) => Delivery {
            recorded: Value::Bool(false),
            broadcast: Value::Bool(true),
            always: true,
        },
        _ => Delivery {
            recorded: value.clone(),
            broadcast: value,
            always: false,
        },
    }
}

/// Put every pulse input back to `false`.
pub(crate) fn reset_inputs(instance: &mut Instance) {
    let node_type = Arc::clone(instance.node_type());
    for key in node_type.pulse_inputs() {
        instance.store_mut().set_input(key, Some(Value::Bool(false)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pulse_writes_are_edge_triggered() {
        let delivery = deliver(OutputKind::Pulse, json!(true));
        assert_eq!(delivery.recorded, json!(false));
        assert_eq!(delivery.broadcast, json!(true));
        assert!(delivery.always);
    }

    #[test]
    fn falsy_pulse_writes_are_plain_values() {
        let delivery = deliver(OutputKind::Pulse, json!(false));
        assert_eq!(delivery.recorded, json!(false));
        assert!(!delivery.always);
    }

    #[test]
    fn value_writes_are_level_triggered() {
        let delivery = deliver(OutputKind::Value, json!(12));
        assert_eq!(delivery.recorded, json!(12));
        assert_eq!(delivery.broadcast, json!(12));
        assert!(!delivery.always);
    }
}
