//! Resource dependency graph
//!
//! Edges point from a dependency to its dependent, so a topological order
//! lists every resource after everything it depends on.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};

use crate::error::GraphError;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index_map: HashMap<String, NodeIndex>,
    /// Insertion order for deterministic tie-breaking
    insertion_order: Vec<NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.index_map.contains_key(logical_id)
    }

    /// Add a resource; adding an existing one is a no-op
    pub fn add_node(&mut self, logical_id: &str) -> NodeIndex {
        if let Some(&idx) = self.index_map.get(logical_id) {
            return idx;
        }
        let idx = self.graph.add_node(logical_id.to_string());
        self.index_map.insert(logical_id.to_string(), idx);
        self.insertion_order.push(idx);
        idx
    }

    /// Declare that `dependent` must be handled after `dependency`
    pub fn add_edge(&mut self, dependency: &str, dependent: &str) -> Result<(), GraphError> {
        let from = self.index_of(dependency)?;
        let to = self.index_of(dependent)?;

        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
        Ok(())
    }

    /// Kahn's algorithm; ready resources are taken in insertion order
    pub fn toposort(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: HashMap<NodeIndex, usize> =
            self.graph.node_indices().map(|idx| (idx, 0)).collect();
        for edge in self.graph.edge_references() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<NodeIndex> = self
            .insertion_order
            .iter()
            .filter(|&&idx| in_degree.get(&idx).copied().unwrap_or(0) == 0)
            .copied()
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(idx) = queue.pop_front() {
            if let Some(node) = self.graph.node_weight(idx) {
                order.push(node.clone());
            }

            for neighbor in self.sorted_neighbors(idx, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&neighbor) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if order.len() != self.graph.node_count() {
            let stuck = self
                .insertion_order
                .iter()
                .find(|&&idx| in_degree.get(&idx).copied().unwrap_or(0) > 0)
                .and_then(|&idx| self.graph.node_weight(idx))
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            return Err(GraphError::Cycle(stuck));
        }

        Ok(order)
    }

    /// Direct dependencies of a resource, in insertion order
    pub fn upstream(&self, logical_id: &str) -> Result<Vec<String>, GraphError> {
        let idx = self.index_of(logical_id)?;
        Ok(self
            .sorted_neighbors(idx, Direction::Incoming)
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect())
    }

    fn index_of(&self, logical_id: &str) -> Result<NodeIndex, GraphError> {
        self.index_map
            .get(logical_id)
            .copied()
            .ok_or_else(|| GraphError::UnknownResource(logical_id.to_string()))
    }

    fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort_by_key(|n| {
            self.insertion_order
                .iter()
                .position(|i| i == n)
                .unwrap_or(usize::MAX)
        });
        neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph_sorts_to_nothing() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert!(graph.toposort().unwrap().is_empty());
    }

    #[test]
    fn test_dependents_follow_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.add_node("function");
        graph.add_node("gate");
        graph.add_node("job");
        graph.add_edge("gate", "function").unwrap();
        graph.add_edge("job", "gate").unwrap();

        assert_eq!(graph.toposort().unwrap(), vec!["job", "gate", "function"]);
    }

    #[test]
    fn test_independent_resources_keep_insertion_order() {
        let mut graph = DependencyGraph::new();
        graph.add_node("b");
        graph.add_node("a");
        graph.add_node("c");

        assert_eq!(graph.toposort().unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");
        graph.add_node("b");
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "a").unwrap();

        assert!(matches!(graph.toposort(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_edges_require_known_resources() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");

        assert_eq!(
            graph.add_edge("a", "missing"),
            Err(GraphError::UnknownResource("missing".to_string()))
        );
    }

    #[test]
    fn test_upstream_lists_direct_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");
        graph.add_node("b");
        graph.add_node("c");
        graph.add_edge("b", "c").unwrap();
        graph.add_edge("a", "c").unwrap();
        graph.add_edge("a", "c").unwrap();

        assert_eq!(graph.upstream("c").unwrap(), vec!["a", "b"]);
        assert!(graph.upstream("a").unwrap().is_empty());
    }
}
