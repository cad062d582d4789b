//! Node Instances
//!
//! An instance is a vertex of the dataflow graph. It owns its value store and
//! the bookkeeping the engine needs to schedule it:
//!
//! - `blocking`: how many of its inputs currently prevent it from running.
//!   The instance is *live* when this is zero.
//! - `valid` / `queued`: whether its outputs reflect its inputs, and whether it
//!   is waiting in the scheduler queue.
//! - link tables in both directions, and the cached set of upstream ids.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

use super::NodeType;
use crate::error::{EngineError, Result};
use crate::store::{InstanceState, ValueStore};

/// Identifier of an instance within its engine.
///
/// Ids are handed out in creation order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The producer feeding an input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSource {
    pub instance: InstanceId,
    pub output: String,
}

/// A consumer fed by an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub instance: InstanceId,
    pub input: String,
}

/// Consumers of one output, in link order.
pub type LinkTargets = SmallVec<[LinkTarget; 2]>;

/// A vertex in the dataflow graph.
pub struct Instance {
    id: InstanceId,
    node_type: Arc<NodeType>,
    store: ValueStore,

    /// Inputs currently keeping this instance from running.
    blocking: usize,

    /// Outputs reflect the current inputs.
    valid: bool,

    /// Sitting in the scheduler queue.
    queued: bool,

    in_links: IndexMap<String, LinkSource>,
    out_links: IndexMap<String, LinkTargets>,

    /// Every instance reachable upstream through input links.
    dependencies: HashSet<InstanceId>,
}

impl Instance {
    /// Create an instance with default inputs and fresh state.
    ///
    /// The instance starts valid and unqueued; the engine invalidates it
    /// right after insertion.
    pub(crate) fn new(id: InstanceId, node_type: Arc<NodeType>, state: InstanceState) -> Self {
        let store = ValueStore::new(node_type.default_inputs(), state);
        let blocking = node_type.required_count();
        Self {
            id,
            node_type,
            store,
            blocking,
            valid: true,
            queued: false,
            in_links: IndexMap::new(),
            out_links: IndexMap::new(),
            dependencies: HashSet::new(),
        }
    }

    /// Get the instance's ID.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Get the instance's node type.
    pub fn node_type(&self) -> &Arc<NodeType> {
        &self.node_type
    }

    /// Whether every input is satisfied, making the instance eligible to run.
    pub fn is_live(&self) -> bool {
        self.blocking == 0
    }

    /// Number of inputs currently blocking execution.
    pub fn blocking_inputs(&self) -> usize {
        self.blocking
    }

    /// Whether the outputs reflect the current inputs.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether the instance is waiting in the scheduler queue.
    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Current value of an input.
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.store.input(key)
    }

    /// Last recorded value of an output.
    pub fn output(&self, key: &str) -> Option<&Value> {
        self.store.output(key)
    }

    /// The value store.
    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    /// Borrow the user state as `T`.
    pub fn state<T: std::any::Any>(&self) -> Result<&T> {
        self.store.state().get::<T>()
    }

    /// The producer feeding an input, if linked.
    pub fn in_link(&self, key: &str) -> Option<&LinkSource> {
        self.in_links.get(key)
    }

    /// All linked inputs.
    pub fn in_links(&self) -> &IndexMap<String, LinkSource> {
        &self.in_links
    }

    /// Consumers of an output.
    pub fn out_links(&self, key: &str) -> &[LinkTarget] {
        self.out_links.get(key).map(|targets| targets.as_slice()).unwrap_or(&[])
    }

    /// Every consumer, across all outputs, in link order.
    pub fn consumers(&self) -> impl Iterator<Item = &LinkTarget> {
        self.out_links.values().flatten()
    }

    /// Cached upstream closure.
    pub fn dependencies(&self) -> &HashSet<InstanceId> {
        &self.dependencies
    }

    /// Whether `other` is upstream of this instance.
    pub fn depends_on(&self, other: InstanceId) -> bool {
        self.dependencies.contains(&other)
    }

    pub(crate) fn store_mut(&mut self) -> &mut ValueStore {
        &mut self.store
    }

    pub(crate) fn mark_invalid(&mut self) {
        self.valid = false;
    }

    pub(crate) fn mark_valid(&mut self) {
        self.valid = true;
    }

    pub(crate) fn set_queued(&mut self, queued: bool) {
        self.queued = queued;
    }

    /// Add one blocking input. Returns `true` if this took the instance from
    /// live to blocked.
    pub(crate) fn add_blocker(&mut self) -> bool {
        self.blocking += 1;
        self.blocking == 1
    }

    /// Remove one blocking input. Returns `true` if this made the instance
    /// live.
    pub(crate) fn remove_blocker(&mut self) -> Result<bool> {
        if self.blocking == 0 {
            return Err(EngineError::invariant(format!(
                "instance {} has no blocking inputs to remove",
                self.id
            )));
        }
        self.blocking -= 1;
        Ok(self.blocking == 0)
    }

    pub(crate) fn attach_source(&mut self, input: &str, source: LinkSource) {
        self.in_links.insert(input.to_owned(), source);
    }

    pub(crate) fn detach_source(&mut self, input: &str) -> Option<LinkSource> {
        self.in_links.shift_remove(input)
    }

    pub(crate) fn attach_target(&mut self, output: &str, target: LinkTarget) {
        self.out_links.entry(output.to_owned()).or_default().push(target);
    }

    pub(crate) fn detach_target(&mut self, output: &str, target: InstanceId, input: &str) {
        if let Some(targets) = self.out_links.get_mut(output) {
            targets.retain(|t| !(t.instance == target && t.input == input));
        }
    }

    pub(crate) fn extend_dependencies(&mut self, ids: &HashSet<InstanceId>) {
        self.dependencies.extend(ids.iter().copied());
    }

    pub(crate) fn replace_dependencies(&mut self, ids: HashSet<InstanceId>) {
        self.dependencies = ids;
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("node_type", &self.node_type.name())
            .field("blocking", &self.blocking)
            .field("valid", &self.valid)
            .field("queued", &self.queued)
            .field("inputs", self.store.inputs())
            .field("outputs", self.store.outputs())
            .finish()
    }
}
