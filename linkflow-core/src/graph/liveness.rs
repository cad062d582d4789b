//! Liveness bookkeeping.
//!
//! Invariant maintained by every structural or value change:
//!
//! ```text
//! blocking(i) = Σ over inputs k of i:
//!     linked from p  =>  p is not live
//!     unlinked       =>  k is required and absent
//! ```

use crate::engine::Engine;
use crate::error::Result;
use crate::node::InstanceId;

impl Engine {
    /// Whether `key` currently contributes to the instance's blocking count.
    pub(crate) fn is_blocking(&self, id: InstanceId, key: &str) -> Result<bool> {
        let instance = self.instance(id)?;
        match instance.in_link(key) {
            Some(source) => Ok(!self.instance(source.instance)?.is_live()),
            None => Ok(instance.node_type().is_required_input(key) && instance.input(key).is_none()),
        }
    }

    /// Adjust the blocking count after one input moved from `was` to `now`.
    pub(crate) fn reconcile(&mut self, id: InstanceId, was: bool, now: bool) -> Result<()> {
        match (was, now) {
            (false, true) => self.block(id),
            (true, false) => self.unblock(id),
            _ => Ok(()),
        }
    }

    /// Add a blocking input. If the instance was live, every consumer loses
    /// a live producer and is blocked in turn.
    ///
    /// A newly blocked instance left queued by an aborted flush is taken off
    /// the queue; it stays invalid.
    fn block(&mut self, id: InstanceId) -> Result<()> {
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let instance = self.instance_mut(next)?;
            if !instance.add_blocker() {
                continue;
            }
            tracing::debug!(instance = %next, "blocked");
            pending.extend(instance.consumers().map(|target| target.instance));
            if instance.is_queued() {
                self.dequeue(next)?;
            }
        }
        Ok(())
    }

    /// Remove a blocking input. If the instance became live, every consumer
    /// gains a live producer and is unblocked in turn.
    fn unblock(&mut self, id: InstanceId) -> Result<()> {
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let instance = self.instance_mut(next)?;
            if instance.remove_blocker()? {
                tracing::debug!(instance = %next, "live");
                pending.extend(instance.consumers().map(|target| target.instance));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{Engine, NodeType};

    #[test]
    fn blocking_follows_links_and_values() {
        let mut engine = Engine::new();
        let source = NodeType::builder("Source").required_input("seed").build().unwrap();
        let sink = NodeType::builder("Sink")
            .required_input("a")
            .default_input("b", json!(0))
            .build()
            .unwrap();

        let s = engine.instantiate(&source, &[]).unwrap();
        let t = engine.instantiate(&sink, &[]).unwrap();
        assert!(engine.is_blocking(t, "a").unwrap());
        assert!(!engine.is_blocking(t, "b").unwrap());

        engine.link(s, "value", t, "b").unwrap();
        assert!(engine.is_blocking(t, "b").unwrap());
        assert_eq!(engine.instance(t).unwrap().blocking_inputs(), 2);

        engine.set_input(s, "seed", json!(1)).unwrap();
        assert!(!engine.is_blocking(t, "b").unwrap());
        assert_eq!(engine.instance(t).unwrap().blocking_inputs(), 1);
    }

    #[test]
    fn liveness_cascades_down_a_chain() {
        let mut engine = Engine::new();
        let pass = NodeType::builder("Pass")
            .required_input("in")
            .resolve(|ctx| {
                let value = ctx.require("in")?.clone();
                ctx.emit(value)
            })
            .build()
            .unwrap();

        let a = engine.instantiate(&pass, &[]).unwrap();
        let b = engine.instantiate(&pass, &[]).unwrap();
        let c = engine.instantiate(&pass, &[]).unwrap();
        engine.link(a, "value", b, "in").unwrap();
        engine.link(b, "value", c, "in").unwrap();
        assert!(!engine.is_running(c).unwrap());

        engine.set_input(a, "in", json!("x")).unwrap();
        assert!(engine.is_running(b).unwrap());
        assert!(engine.is_running(c).unwrap());
        assert_eq!(engine.output_value(c, "value").unwrap(), Some(&json!("x")));

        engine.clear_input(a, "in").unwrap();
        assert!(!engine.is_running(a).unwrap());
        assert!(!engine.is_running(b).unwrap());
        assert!(!engine.is_running(c).unwrap());
    }

    #[test]
    fn unblocking_a_live_instance_is_an_invariant_violation() {
        let mut engine = Engine::new();
        let free = NodeType::builder("Free").build().unwrap();
        let id = engine.instantiate(&free, &[]).unwrap();

        let err = engine.reconcile(id, true, false).unwrap_err();
        assert!(err.is_invariant());
    }
}
