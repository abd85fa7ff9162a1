//! A set of resources and the order they must be provisioned in

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GraphError;
use crate::graph::DependencyGraph;
use crate::hook::LifecycleHook;

#[derive(Clone, Default)]
pub struct Stack {
    hooks: HashMap<String, Arc<dyn LifecycleHook>>,
    graph: DependencyGraph,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, rejecting a second resource with the same logical id
    pub fn add(&mut self, hook: Arc<dyn LifecycleHook>) -> Result<(), GraphError> {
        let logical_id = hook.logical_id().to_string();
        if self.hooks.contains_key(&logical_id) {
            return Err(GraphError::DuplicateResource(logical_id));
        }

        self.graph.add_node(&logical_id);
        self.hooks.insert(logical_id, hook);
        Ok(())
    }

    /// Order `dependent` after `dependency`
    pub fn depends_on(&mut self, dependent: &str, dependency: &str) -> Result<(), GraphError> {
        self.graph.add_edge(dependency, dependent)
    }

    pub fn hook(&self, logical_id: &str) -> Option<&Arc<dyn LifecycleHook>> {
        self.hooks.get(logical_id)
    }

    /// Resources in dependency order
    pub fn hooks(&self) -> Result<Vec<Arc<dyn LifecycleHook>>, GraphError> {
        self.graph
            .toposort()?
            .into_iter()
            .map(|logical_id| {
                self.hooks
                    .get(&logical_id)
                    .cloned()
                    .ok_or(GraphError::UnknownResource(logical_id))
            })
            .collect()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}
