//! Dense index view of a [`DependencyGraph`] for the analysis algorithms.
//!
//! Node `i` is the `i`-th node in insertion order. Adjacency lists hold
//! distinct neighbours only (parallel edges of different types collapse)
//! and self-loops are dropped, which is the simple directed graph every
//! centrality measure is defined over.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::graph::DependencyGraph;

/// Read-only adjacency snapshot. Cheap to build, never mutated.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Node ids by dense index.
    pub ids: Vec<String>,
    /// Map from node id → dense index.
    pub index: HashMap<String, usize>,
    /// `out[i]` = distinct successors of `i`.
    pub out: Vec<Vec<usize>>,
    /// `inc[i]` = distinct predecessors of `i`.
    pub inc: Vec<Vec<usize>>,
}

impl Topology {
    pub(crate) fn build(graph: &DependencyGraph) -> Self {
        let ids: Vec<String> = graph.nodes().map(|n| n.id.clone()).collect();
        let index: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut out_sets: Vec<IndexSet<usize>> = vec![IndexSet::new(); ids.len()];
        for edge in graph.edges() {
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                if s != t {
                    out_sets[s].insert(t);
                }
            }
        }

        let mut inc = vec![Vec::new(); ids.len()];
        for (s, targets) in out_sets.iter().enumerate() {
            for &t in targets {
                inc[t].push(s);
            }
        }
        let out = out_sets
            .into_iter()
            .map(|set| set.into_iter().collect())
            .collect();

        Self {
            ids,
            index,
            out,
            inc,
        }
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.out.iter().map(Vec::len).sum()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn in_degree(&self, i: usize) -> usize {
        self.inc[i].len()
    }

    pub fn out_degree(&self, i: usize) -> usize {
        self.out[i].len()
    }

    pub fn degree(&self, i: usize) -> usize {
        self.inc[i].len() + self.out[i].len()
    }

    /// Simple undirected adjacency: `a→b` and `b→a` collapse to one edge.
    pub fn undirected(&self) -> Vec<Vec<usize>> {
        let mut sets: Vec<IndexSet<usize>> = vec![IndexSet::new(); self.node_count()];
        for (s, targets) in self.out.iter().enumerate() {
            for &t in targets {
                sets[s].insert(t);
                sets[t].insert(s);
            }
        }
        sets.into_iter()
            .map(|set| set.into_iter().collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::types::{Edge, EdgeType, Node, Tier};

    #[test]
    fn test_parallel_edges_collapse() {
        let mut g = DependencyGraph::new();
        for id in ["a", "b"] {
            g.add_node(Node::new(id, Tier::STANDARD)).unwrap();
        }
        g.add_edge(Edge::new("a", "b", EdgeType::DependsOn)).unwrap();
        g.add_edge(Edge::new("a", "b", EdgeType::Supplies)).unwrap();
        g.add_edge(Edge::new("b", "a", EdgeType::Supplies)).unwrap();
        g.add_edge(Edge::new("a", "a", EdgeType::Supplies)).unwrap();

        let topo = g.topology();
        assert_eq!(topo.out[0], vec![1]);
        assert_eq!(topo.inc[0], vec![1]);
        assert_eq!(topo.edge_count(), 2);
        assert_eq!(topo.undirected()[0], vec![1]);
        assert_eq!(topo.degree(0), 2);
    }

    #[test]
    fn test_indices_follow_insertion_order() {
        let mut g = DependencyGraph::new();
        for id in ["z", "m", "a"] {
            g.add_node(Node::new(id, Tier::STANDARD)).unwrap();
        }
        let topo = g.topology();
        assert_eq!(topo.ids, vec!["z", "m", "a"]);
        assert_eq!(topo.index_of("a"), Some(2));
        assert_eq!(topo.index_of("q"), None);
    }
}
