//! Dependency closures.

use std::collections::{HashSet, VecDeque};

use crate::engine::Engine;
use crate::error::Result;
use crate::node::InstanceId;

impl Engine {
    /// Every instance reachable upstream of `id` by following input links.
    pub fn upstream_of(&self, id: InstanceId) -> Result<HashSet<InstanceId>> {
        let mut upstream = HashSet::new();
        let mut queue = VecDeque::from([id]);

        while let Some(next) = queue.pop_front() {
            for source in self.instance(next)?.in_links().values() {
                if upstream.insert(source.instance) {
                    queue.push_back(source.instance);
                }
            }
        }
        Ok(upstream)
    }

    /// Rebuild the cached dependency set of `id` from its current links.
    pub(crate) fn recompute_dependencies(&mut self, id: InstanceId) -> Result<()> {
        let upstream = self.upstream_of(id)?;
        self.instance_mut(id)?.replace_dependencies(upstream);
        Ok(())
    }

    /// After linking `from` into `to`, everything downstream of `to`
    /// (including `to`) also depends on `from` and on its dependencies.
    pub(crate) fn extend_dependencies(&mut self, from: InstanceId, to: InstanceId) -> Result<()> {
        let mut added = self.instance(from)?.dependencies().clone();
        added.insert(from);

        let mut visited = HashSet::from([to]);
        let mut queue = VecDeque::from([to]);
        while let Some(next) = queue.pop_front() {
            let instance = self.instance_mut(next)?;
            instance.extend_dependencies(&added);
            for target in instance.consumers() {
                if visited.insert(target.instance) {
                    queue.push_back(target.instance);
                }
            }
        }
        Ok(())
    }
}
