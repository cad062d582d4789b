//! Linking, unlinking and external input assignment.

use std::sync::Arc;

use serde_json::Value;

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::node::{InstanceId, LinkSource, LinkTarget};

impl Engine {
    /// Feed `to.input` from `from.output`.
    ///
    /// Any link already occupying `to.input` is replaced. If `from` already
    /// holds a value for `output` it is pushed into `to` right away.
    pub fn link(&mut self, from: InstanceId, output: &str, to: InstanceId, input: &str) -> Result<()> {
        if from == to {
            return Err(EngineError::SelfLink(from));
        }
        let producer = self.instance(from)?.node_type();
        if !producer.defines_output(output) {
            return Err(producer.unknown_output(output));
        }
        let consumer = Arc::clone(self.instance(to)?.node_type());
        if !consumer.defines_input(input) {
            return Err(consumer.unknown_input(input));
        }

        self.detach(to, input)?;

        self.instance_mut(from)?.attach_target(
            output,
            LinkTarget {
                instance: to,
                input: input.to_owned(),
            },
        );
        self.instance_mut(to)?.attach_source(
            input,
            LinkSource {
                instance: from,
                output: output.to_owned(),
            },
        );
        let producer_blocked = !self.instance(from)?.is_live();
        self.reconcile(to, consumer.is_required_input(input), producer_blocked)?;
        self.extend_dependencies(from, to)?;
        tracing::debug!(%from, output, %to, input, "linked");

        if let Some(value) = self.instance(from)?.output(output).cloned() {
            let value = consumer.normalize_input(input, Some(value));
            if self.instance_mut(to)?.store_mut().set_input(input, value) {
                self.invalidate(to)?;
            }
        }
        self.flush()
    }

    /// Disconnect whatever feeds `id.input` and reset the input to its
    /// default.
    ///
    /// Unlinking an input without a link is not an error: a value set
    /// directly is cleared the same way.
    pub fn unlink(&mut self, id: InstanceId, input: &str) -> Result<()> {
        let node_type = Arc::clone(self.instance(id)?.node_type());
        if !node_type.defines_input(input) {
            return Err(node_type.unknown_input(input));
        }

        self.detach(id, input)?;

        if self.instance_mut(id)?.store_mut().set_input(input, node_type.default_input(input)) {
            self.invalidate(id)?;
        }
        self.flush()
    }

    /// Assign inputs directly, bypassing links. `None` clears an input; a
    /// pulse input stores `true` for any truthy value and `false` otherwise.
    ///
    /// Setting or clearing an unlinked required input makes the instance
    /// live or blocked exactly as a link would. Values set on a linked input
    /// are overwritten by the next value its producer delivers, and do not
    /// change liveness. Unknown keys fail before anything is applied.
    pub fn set_input_values<I, K>(&mut self, id: InstanceId, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Option<Value>)>,
        K: Into<String>,
    {
        let values: Vec<(String, Option<Value>)> =
            values.into_iter().map(|(key, value)| (key.into(), value)).collect();
        let node_type = Arc::clone(self.instance(id)?.node_type());
        if let Some((key, _)) = values.iter().find(|(key, _)| !node_type.defines_input(key)) {
            return Err(node_type.unknown_input(key));
        }

        let mut changed = false;
        for (key, value) in values {
            let was = self.is_blocking(id, &key)?;
            let value = node_type.normalize_input(&key, value);
            if !self.instance_mut(id)?.store_mut().set_input(&key, value) {
                continue;
            }
            changed = true;
            let now = self.is_blocking(id, &key)?;
            self.reconcile(id, was, now)?;
        }

        if changed {
            self.invalidate(id)?;
        }
        self.flush()
    }

    /// Assign a single input.
    pub fn set_input(&mut self, id: InstanceId, key: &str, value: Value) -> Result<()> {
        self.set_input_values(id, [(key, Some(value))])
    }

    /// Clear a single input back to absent.
    pub fn clear_input(&mut self, id: InstanceId, key: &str) -> Result<()> {
        self.set_input_values(id, [(key, None)])
    }

    /// Remove the link feeding `id.input`, if any, and treat the slot as
    /// reset: afterwards it blocks exactly when it is required.
    fn detach(&mut self, id: InstanceId, input: &str) -> Result<()> {
        let was = self.is_blocking(id, input)?;
        let removed = self.instance_mut(id)?.detach_source(input);
        if let Some(source) = &removed {
            self.instance_mut(source.instance)?
                .detach_target(&source.output, id, input);
        }

        let required = self.instance(id)?.node_type().is_required_input(input);
        self.reconcile(id, was, required)?;

        if let Some(source) = removed {
            self.recompute_dependencies(id)?;
            tracing::debug!(from = %source.instance, output = %source.output, to = %id, input, "unlinked");
        }
        Ok(())
    }
}
