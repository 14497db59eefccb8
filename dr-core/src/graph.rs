//! Dependency graph: adjacency lists with in-degree counting, exposing
//! the three operations the scheduler needs (`ready`, `done`, `successors`).
//!
//! Shape mirrors a Kahn's-algorithm topological sort: `edges` is the
//! forward adjacency list (`n -> after[n]`), `reverse_edges` lets
//! `successors` answer in O(1) lookups, and `in_degree` is decremented as
//! nodes complete so `ready()` stays cheap to recompute every batch.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashSet<String>,
    edges: HashMap<String, Vec<String>>,
    reverse_edges: HashMap<String, Vec<String>>,
    in_degree: HashMap<String, usize>,
    done: HashSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) {
        if self.nodes.insert(name.to_string()) {
            self.edges.entry(name.to_string()).or_default();
            self.reverse_edges.entry(name.to_string()).or_default();
            self.in_degree.entry(name.to_string()).or_insert(0);
        }
    }

    /// Adds an edge `from -> to` (`to` depends on `from` having completed).
    /// Both endpoints must already be present via `add_node`; callers are
    /// expected to have dropped edges to unknown nodes before calling this.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        debug_assert!(self.nodes.contains(from) && self.nodes.contains(to));
        let forward = self.edges.entry(from.to_string()).or_default();
        if !forward.iter().any(|n| n == to) {
            forward.push(to.to_string());
            self.reverse_edges
                .entry(to.to_string())
                .or_default()
                .push(from.to_string());
            *self.in_degree.entry(to.to_string()).or_insert(0) += 1;
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_active(&self) -> bool {
        self.done.len() < self.nodes.len()
    }

    /// Nodes with zero remaining in-degree that have not yet completed.
    pub fn ready(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| !self.done.contains(*n) && self.in_degree.get(*n).copied().unwrap_or(0) == 0)
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// Marks `node` complete, decrementing the in-degree of everything it
    /// points at so they can become ready on the next `ready()` call.
    pub fn done(&mut self, node: &str) {
        if self.done.insert(node.to_string()) {
            if let Some(targets) = self.edges.get(node).cloned() {
                for t in targets {
                    if let Some(d) = self.in_degree.get_mut(&t) {
                        *d = d.saturating_sub(1);
                    }
                }
            }
        }
    }

    /// One-hop successors of `node` (nodes that depend directly on it).
    pub fn successors(&self, node: &str) -> Vec<String> {
        self.reverse_edges.get(node).cloned().unwrap_or_default()
    }

    /// Every transitive successor of `node`, used by cascade-skip.
    pub fn transitive_successors(&self, node: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = self.successors(node);
        while let Some(n) = stack.pop() {
            if seen.insert(n.clone()) {
                stack.extend(self.successors(&n));
            }
        }
        seen
    }

    /// Kahn's algorithm topological sort. Returns `None` on a cycle.
    /// Consumes in-degree and edges as built so far; does not mutate the
    /// `done` set used by the live scheduler walk.
    pub fn topological_sort(&self) -> Option<Vec<String>> {
        let mut in_degree = self.in_degree.clone();
        let mut queue: std::collections::VecDeque<String> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| n.clone())
            .collect();
        let mut ordered: Vec<String> = queue.iter().cloned().collect();
        ordered.sort();
        let mut queue: std::collections::VecDeque<String> = ordered.into();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(n) = queue.pop_front() {
            result.push(n.clone());
            let mut newly_ready = Vec::new();
            if let Some(targets) = self.edges.get(&n) {
                for t in targets {
                    if let Some(d) = in_degree.get_mut(t) {
                        *d = d.saturating_sub(1);
                        if *d == 0 {
                            newly_ready.push(t.clone());
                        }
                    }
                }
            }
            newly_ready.sort();
            for t in newly_ready {
                queue.push_back(t);
            }
        }

        if result.len() == self.nodes.len() {
            Some(result)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_abc_linear() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in ["A", "B", "C"] {
            g.add_node(n);
        }
        g.add_edge("A", "B");
        g.add_edge("B", "C");
        g
    }

    #[test]
    fn topo_sort_orders_linear_chain() {
        let g = graph_abc_linear();
        assert_eq!(g.topological_sort(), Some(vec!["A".into(), "B".into(), "C".into()]));
    }

    #[test]
    fn cycle_returns_none() {
        let mut g = DependencyGraph::new();
        g.add_node("A");
        g.add_node("B");
        g.add_edge("A", "B");
        g.add_edge("B", "A");
        assert_eq!(g.topological_sort(), None);
    }

    #[test]
    fn ready_and_done_advance_frontier() {
        let mut g = graph_abc_linear();
        assert_eq!(g.ready(), vec!["A".to_string()]);
        g.done("A");
        assert_eq!(g.ready(), vec!["B".to_string()]);
        assert_eq!(g.successors("A"), vec!["B".to_string()]);
        assert!(g.transitive_successors("A").contains("C"));
    }

    #[test]
    fn is_active_false_once_all_done() {
        let mut g = graph_abc_linear();
        g.done("A");
        g.done("B");
        assert!(g.is_active());
        g.done("C");
        assert!(!g.is_active());
    }
}
