//! Engine
//!
//! The engine is the context object that owns a dataflow graph: its
//! instances, the run scheduler, the instance id counter, the diagnostic hook
//! and the writes deferred to later turns. Independent graphs use independent
//! engines.
//!
//! # Execution Model
//!
//! 1. Any change to an instance's inputs *invalidates* it. Invalidation of a
//!    live instance queues it with the scheduler.
//!
//! 2. Every public operation that may invalidate instances finishes with a
//!    *flush*: queued instances execute one by one until the queue is empty.
//!
//! 3. An execution calls the type's resolve function. Its output writes flow
//!    into linked inputs, invalidating consumers, which join the same flush.
//!
//! 4. Each instance executes at most once per flush, so a flush always
//!    terminates, even in cyclic graphs.
//!
//! 5. A failed execution aborts the flush and its error is returned. The
//!    failed instance stays invalid; instances still queued run in the next
//!    flush.
//!
//! Writes a resolve function defers (see [`Resolve::defer`]) are applied in
//! a later turn by [`Engine::run_deferred`], each in its own flush.
//!
//! # Threading
//!
//! The engine is single-threaded: it is mutated through `&mut self` and
//! resolve functions run to completion. Node types are `Send + Sync` and can
//! be shared between engines.

mod pulse;
mod resolve;
mod scheduler;

pub use resolve::Resolve;
pub use scheduler::Scheduler;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::node::{Instance, InstanceId, LinkTargets, NodeType, OutputKind};

/// A batch of output writes, applied in order.
pub type OutputWrites = SmallVec<[(String, Value); 2]>;

/// Hook run before every execution.
pub type BeforeRunHook = Box<dyn FnMut(&Instance) + Send>;

/// Writes deferred to a later turn.
#[derive(Debug)]
struct Deferred {
    instance: InstanceId,
    writes: OutputWrites,
}

/// Serializable view of an instance, for logging and debugging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSnapshot {
    pub id: InstanceId,
    pub node_type: String,
    pub live: bool,
    pub valid: bool,
    pub inputs: IndexMap<String, Option<Value>>,
    pub outputs: IndexMap<String, Value>,
}

/// Owner of a dataflow graph.
pub struct Engine {
    config: EngineConfig,

    /// All instances, in creation order.
    instances: IndexMap<InstanceId, Instance>,

    next_id: u64,
    scheduler: Scheduler,
    deferred: VecDeque<Deferred>,
    before_run: Option<BeforeRunHook>,
    instance_hooks: HashMap<InstanceId, BeforeRunHook>,
}

impl Engine {
    /// Create an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            instances: IndexMap::new(),
            next_id: 0,
            scheduler: Scheduler::new(),
            deferred: VecDeque::new(),
            before_run: None,
            instance_hooks: HashMap::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create an instance of `node_type`.
    ///
    /// `args` are handed to the type's state factory, if it has one. An
    /// instance without required inputs executes before this returns.
    pub fn instantiate(&mut self, node_type: &Arc<NodeType>, args: &[Value]) -> Result<InstanceId> {
        let id = InstanceId::new(self.next_id);
        self.next_id += 1;

        let state = node_type.init_state(args);
        let instance = Instance::new(id, Arc::clone(node_type), state);
        tracing::debug!(instance = %id, node_type = node_type.name(), live = instance.is_live(), "instantiated");
        self.instances.insert(id, instance);

        self.invalidate(id)?;
        self.flush()?;
        Ok(id)
    }

    /// Look up an instance.
    pub fn instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances.get(&id).ok_or(EngineError::UnknownInstance(id))
    }

    /// All instances in creation order.
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the engine has no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Whether the instance is live, i.e. none of its inputs block it.
    pub fn is_running(&self, id: InstanceId) -> Result<bool> {
        Ok(self.instance(id)?.is_live())
    }

    /// Last recorded value of an output. `None` until first written.
    pub fn output_value(&self, id: InstanceId, key: &str) -> Result<Option<&Value>> {
        let instance = self.instance(id)?;
        if !instance.node_type().defines_output(key) {
            return Err(instance.node_type().unknown_output(key));
        }
        Ok(instance.output(key))
    }

    /// Current value of an input. `None` while absent.
    pub fn input_value(&self, id: InstanceId, key: &str) -> Result<Option<&Value>> {
        let instance = self.instance(id)?;
        if !instance.node_type().defines_input(key) {
            return Err(instance.node_type().unknown_input(key));
        }
        Ok(instance.input(key))
    }

    /// Capture an instance's current values.
    pub fn snapshot(&self, id: InstanceId) -> Result<InstanceSnapshot> {
        let instance = self.instance(id)?;
        Ok(InstanceSnapshot {
            id,
            node_type: instance.node_type().name().to_owned(),
            live: instance.is_live(),
            valid: instance.is_valid(),
            inputs: instance.store().inputs().clone(),
            outputs: instance.store().outputs().clone(),
        })
    }

    /// Invoke an extra method declared by the instance's type.
    pub fn call(&mut self, id: InstanceId, name: &str, args: &[Value]) -> Result<Value> {
        let node_type = Arc::clone(self.instance(id)?.node_type());
        let method = node_type.method(name).ok_or_else(|| EngineError::UnknownMethod {
            node_type: node_type.name().to_owned(),
            name: name.to_owned(),
        })?;
        tracing::trace!(instance = %id, method = name, "call");
        method(self, id, args)
    }

    /// Write outputs of an instance from outside a flush, then flush.
    ///
    /// This is how source instances are driven and how methods emit values.
    /// Unknown keys fail before any write is applied.
    pub fn output<I, K>(&mut self, id: InstanceId, writes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let writes: OutputWrites = writes.into_iter().map(|(key, value)| (key.into(), value)).collect();
        self.route_outputs(id, writes)?;
        self.flush()
    }

    /// Whether writes are waiting for a later turn.
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Run one turn: apply every write deferred so far, each in its own
    /// flush. Writes deferred during this turn wait for the next one.
    ///
    /// Returns the number of deferred batches applied.
    pub fn run_deferred(&mut self) -> Result<usize> {
        let due = self.deferred.len();
        for _ in 0..due {
            let Some(deferred) = self.deferred.pop_front() else {
                break;
            };
            self.route_outputs(deferred.instance, deferred.writes)?;
            self.flush()?;
        }
        Ok(due)
    }

    /// Run turns until nothing is deferred or the configured turn limit is
    /// reached. Returns the number of turns run.
    pub fn run_until_idle(&mut self) -> Result<usize> {
        let mut turns = 0;
        while self.has_deferred() && turns < self.config.turn_limit {
            self.run_deferred()?;
            turns += 1;
        }
        if self.has_deferred() {
            tracing::debug!(turns, pending = self.deferred.len(), "turn limit reached");
        }
        Ok(turns)
    }

    /// Install a hook called with each instance right before it executes.
    ///
    /// Meant for diagnostics and tests; it cannot affect scheduling.
    pub fn set_before_run<F>(&mut self, hook: F)
    where
        F: FnMut(&Instance) + Send + 'static,
    {
        self.before_run = Some(Box::new(hook));
    }

    /// Remove the before-run hook.
    pub fn clear_before_run(&mut self) {
        self.before_run = None;
    }

    /// Install a hook called right before one instance executes, after the
    /// engine-wide hook. Replaces any hook already set on that instance.
    pub fn set_instance_before_run<F>(&mut self, id: InstanceId, hook: F) -> Result<()>
    where
        F: FnMut(&Instance) + Send + 'static,
    {
        self.instance(id)?;
        self.instance_hooks.insert(id, Box::new(hook));
        Ok(())
    }

    /// Remove an instance's before-run hook. Returns `false` if it had none.
    pub fn clear_instance_before_run(&mut self, id: InstanceId) -> bool {
        self.instance_hooks.remove(&id).is_some()
    }

    pub(crate) fn instance_mut(&mut self, id: InstanceId) -> Result<&mut Instance> {
        self.instances.get_mut(&id).ok_or(EngineError::UnknownInstance(id))
    }

    /// Mark an instance as needing to run and queue it.
    ///
    /// Does nothing for blocked instances. An instance that already executed
    /// in the running flush stays invalid without being queued; its next
    /// invalidation queues it.
    pub(crate) fn invalidate(&mut self, id: InstanceId) -> Result<()> {
        let instance = self.instances.get_mut(&id).ok_or(EngineError::UnknownInstance(id))?;
        if !instance.is_live() {
            return Ok(());
        }
        instance.mark_invalid();
        if instance.is_queued() {
            return Ok(());
        }
        if self.scheduler.has_executed(id) {
            tracing::trace!(instance = %id, "already executed in this flush");
            return Ok(());
        }
        instance.set_queued(true);

        let instances = &self.instances;
        self.scheduler.enqueue(id, |queued| {
            instances.get(&queued).is_some_and(|waiting| waiting.depends_on(id))
        });
        Ok(())
    }

    /// Take a queued instance off the queue without running it.
    pub(crate) fn dequeue(&mut self, id: InstanceId) -> Result<()> {
        self.instance_mut(id)?.set_queued(false);
        if self.scheduler.remove(id) {
            tracing::trace!(instance = %id, "dequeued");
        }
        Ok(())
    }

    /// Drain the queue, unless a flush is already draining it.
    ///
    /// If an execution fails, the instances still queued stay queued and
    /// run at the start of the next flush.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if !self.scheduler.begin_flush() {
            return Ok(());
        }
        let result = self.drain();
        self.scheduler.end_flush();
        if !self.scheduler.is_empty() {
            tracing::debug!(pending = self.scheduler.len(), "flush aborted, leftovers stay queued");
        }
        result
    }

    fn drain(&mut self) -> Result<()> {
        let mut executed = 0;
        loop {
            if let Some(limit) = self.config.flush_limit {
                if executed >= limit && !self.scheduler.is_empty() {
                    return Err(EngineError::FlushLimitExceeded { limit });
                }
            }
            let Some(id) = self.scheduler.pop() else {
                break;
            };
            self.execute(id)?;
            executed += 1;
        }
        tracing::trace!(executed, "flush complete");
        Ok(())
    }

    fn execute(&mut self, id: InstanceId) -> Result<()> {
        let instance = self.instances.get_mut(&id).ok_or(EngineError::UnknownInstance(id))?;
        instance.set_queued(false);
        if !instance.is_live() {
            return Err(EngineError::invariant(format!(
                "instance {id} scheduled with {} blocking inputs",
                instance.blocking_inputs()
            )));
        }
        if let Some(hook) = self.before_run.as_mut() {
            hook(instance);
        }
        if let Some(hook) = self.instance_hooks.get_mut(&id) {
            hook(instance);
        }

        let node_type = Arc::clone(instance.node_type());
        let (inputs, state) = instance.store_mut().resolve_parts();
        let mut ctx = Resolve::new(id, &node_type, inputs, state);
        let resolved = (node_type.resolver())(&mut ctx);
        let (writes, deferred) = ctx.into_writes();
        pulse::reset_inputs(instance);
        resolved?;
        tracing::trace!(instance = %id, node_type = node_type.name(), writes = writes.len(), "executed");

        if !deferred.is_empty() {
            self.deferred.push_back(Deferred {
                instance: id,
                writes: deferred,
            });
        }
        self.route_outputs(id, writes)?;

        self.instance_mut(id)?.mark_valid();
        Ok(())
    }

    /// Record output writes and push them into linked inputs.
    fn route_outputs(&mut self, id: InstanceId, writes: OutputWrites) -> Result<()> {
        let node_type = Arc::clone(self.instance(id)?.node_type());
        let kinds = writes
            .iter()
            .map(|(key, _)| node_type.output_kind(key).ok_or_else(|| node_type.unknown_output(key)))
            .collect::<Result<SmallVec<[OutputKind; 2]>>>()?;

        for ((key, value), kind) in writes.into_iter().zip(kinds) {
            let delivery = pulse::deliver(kind, value);
            let producer = self.instance_mut(id)?;
            producer.store_mut().record_output(&key, delivery.recorded);
            let targets: LinkTargets = producer.out_links(&key).iter().cloned().collect();

            for target in targets {
                let consumer = self.instance_mut(target.instance)?;
                let value = consumer
                    .node_type()
                    .normalize_input(&target.input, Some(delivery.broadcast.clone()));
                let changed = consumer.store_mut().set_input(&target.input, value);
                if changed || delivery.always {
                    self.invalidate(target.instance)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("instances", &self.instances.len())
            .field("scheduler", &self.scheduler)
            .field("deferred", &self.deferred.len())
            .field("instance_hooks", &self.instance_hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn source() -> Arc<NodeType> {
        NodeType::builder("Source").output("a").output("b").build().unwrap()
    }

    #[test]
    fn ids_follow_creation_order() {
        let mut engine = Engine::new();
        let node_type = source();
        let first = engine.instantiate(&node_type, &[]).unwrap();
        let second = engine.instantiate(&node_type, &[]).unwrap();

        assert!(first < second);
        assert_eq!(engine.len(), 2);
        let ids: Vec<_> = engine.instances().map(Instance::id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn state_factory_receives_constructor_args() {
        let mut engine = Engine::new();
        let node_type = NodeType::builder("Named")
            .state_with(|args: &[Value]| args.first().and_then(Value::as_str).unwrap_or("").to_owned())
            .build()
            .unwrap();

        let id = engine.instantiate(&node_type, &[json!("left")]).unwrap();
        let other = engine.instantiate(&node_type, &[]).unwrap();
        assert_eq!(engine.instance(id).unwrap().state::<String>().unwrap(), "left");
        assert_eq!(engine.instance(other).unwrap().state::<String>().unwrap(), "");
        assert!(matches!(
            engine.instance(id).unwrap().state::<u8>(),
            Err(EngineError::StateType(_))
        ));
    }

    #[test]
    fn output_batch_with_unknown_key_writes_nothing() {
        let mut engine = Engine::new();
        let id = engine.instantiate(&source(), &[]).unwrap();

        let err = engine.output(id, [("a", json!(1)), ("nope", json!(2))]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownOutput { key, .. } if key == "nope"));
        assert_eq!(engine.output_value(id, "a").unwrap(), None);

        engine.output(id, [("a", json!(1)), ("b", json!(2))]).unwrap();
        assert_eq!(engine.output_value(id, "b").unwrap(), Some(&json!(2)));
        assert!(matches!(engine.output_value(id, "value"), Err(EngineError::UnknownOutput { .. })));
    }

    #[test]
    fn before_run_hook_can_be_cleared() {
        let mut engine = Engine::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        engine.set_before_run(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let node_type = NodeType::builder("Free").build().unwrap();
        engine.instantiate(&node_type, &[]).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        engine.clear_before_run();
        engine.instantiate(&node_type, &[]).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn instance_hook_runs_only_for_its_instance() {
        let mut engine = Engine::new();
        let node_type = NodeType::builder("Pass")
            .required_input("in")
            .resolve(|ctx| {
                let value = ctx.require("in")?.clone();
                ctx.emit(value)
            })
            .build()
            .unwrap();
        let a = engine.instantiate(&node_type, &[]).unwrap();
        let b = engine.instantiate(&node_type, &[]).unwrap();
        engine.link(a, "value", b, "in").unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        engine
            .set_instance_before_run(b, move |instance| {
                assert_eq!(instance.input("in"), Some(&json!(1)));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        engine.set_input(a, "in", json!(1)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(engine.clear_instance_before_run(b));
        assert!(!engine.clear_instance_before_run(b));
        engine.set_input(a, "in", json!(2)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let missing = InstanceId::new(99);
        let err = engine.set_instance_before_run(missing, |_| {}).unwrap_err();
        assert!(matches!(err, EngineError::UnknownInstance(id) if id == missing));
    }

    #[test]
    fn nothing_deferred_means_no_turns() {
        let mut engine = Engine::new();
        assert!(!engine.has_deferred());
        assert_eq!(engine.run_deferred().unwrap(), 0);
        assert_eq!(engine.run_until_idle().unwrap(), 0);
    }
}
