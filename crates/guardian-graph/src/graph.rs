//! The mutable dependency graph.
//!
//! Storage is insertion ordered so every traversal, export and fingerprint
//! is reproducible across runs. At most one edge exists per
//! `(source, target, edge_type)`; re-adding one overwrites it in place.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use guardian_core::types::{edge_label, Edge, EdgeType, Node};

use crate::error::{GraphError, Result};
use crate::topology::Topology;

type EdgeKey = (String, EdgeType);

/// Directed multi-typed dependency graph keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: IndexMap<String, Node>,
    /// `outgoing[source]` = edges keyed by `(target, edge_type)`.
    outgoing: IndexMap<String, IndexMap<EdgeKey, Edge>>,
    /// `incoming[target]` = distinct predecessor ids.
    incoming: IndexMap<String, IndexSet<String>>,
    edge_count: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Mutation ─────────────────────────────────────────────────

    /// Insert a node, or replace the attributes of an existing one while
    /// keeping its edges.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        node.validate()?;
        let id = node.id.clone();
        if self.nodes.insert(id.clone(), node).is_none() {
            self.outgoing.insert(id.clone(), IndexMap::new());
            self.incoming.insert(id, IndexSet::new());
        }
        Ok(())
    }

    /// Insert or overwrite the edge for `(source, target, edge_type)`.
    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        edge.validate()?;
        self.require(&edge.source)?;
        self.require(&edge.target)?;

        let source = edge.source.clone();
        let target = edge.target.clone();
        let key = (target.clone(), edge.edge_type);

        let out = self
            .outgoing
            .get_mut(&source)
            .ok_or_else(|| not_found(&source))?;
        if out.insert(key, edge).is_none() {
            self.edge_count += 1;
        }
        if let Some(preds) = self.incoming.get_mut(&target) {
            preds.insert(source);
        }
        Ok(())
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        let node = self.nodes.shift_remove(id).ok_or_else(|| not_found(id))?;

        if let Some(out) = self.outgoing.shift_remove(id) {
            self.edge_count -= out.len();
            for (target, _) in out.keys() {
                if let Some(preds) = self.incoming.get_mut(target) {
                    preds.shift_remove(id);
                }
            }
        }

        if let Some(preds) = self.incoming.shift_remove(id) {
            for pred in &preds {
                if let Some(out) = self.outgoing.get_mut(pred) {
                    let before = out.len();
                    out.retain(|(target, _), _| target != id);
                    self.edge_count -= before - out.len();
                }
            }
        }

        Ok(node)
    }

    /// Remove every edge from `source` to `target`, whatever its type.
    pub fn remove_edge(&mut self, source: &str, target: &str) -> Result<Vec<Edge>> {
        let out = self
            .outgoing
            .get_mut(source)
            .ok_or_else(|| not_found(source))?;

        let keys: Vec<EdgeKey> = out.keys().filter(|(t, _)| t == target).cloned().collect();
        if keys.is_empty() {
            return Err(GraphError::EdgeNotFound {
                edge: edge_label(source, target),
            });
        }

        let removed: Vec<Edge> = keys.iter().filter_map(|k| out.shift_remove(k)).collect();
        self.edge_count -= removed.len();
        if let Some(preds) = self.incoming.get_mut(target) {
            preds.shift_remove(source);
        }
        Ok(removed)
    }

    /// Remove the single edge of `edge_type` from `source` to `target`.
    pub fn remove_edge_of_type(
        &mut self,
        source: &str,
        target: &str,
        edge_type: EdgeType,
    ) -> Result<Edge> {
        let out = self
            .outgoing
            .get_mut(source)
            .ok_or_else(|| not_found(source))?;
        let edge = out
            .shift_remove(&(target.to_string(), edge_type))
            .ok_or_else(|| GraphError::EdgeNotFound {
                edge: format!("{} ({edge_type})", edge_label(source, target)),
            })?;
        self.edge_count -= 1;

        let still_linked = out.keys().any(|(t, _)| t == target);
        if !still_linked {
            if let Some(preds) = self.incoming.get_mut(target) {
                preds.shift_remove(source);
            }
        }
        Ok(edge)
    }

    // ── Lookup ───────────────────────────────────────────────────

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.outgoing
            .get(source)
            .is_some_and(|out| out.keys().any(|(t, _)| t == target))
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Edges grouped by source node, each group in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.outgoing.values().flat_map(|out| out.values())
    }

    /// Outgoing edges of one node in insertion order.
    pub fn out_edges(&self, id: &str) -> Result<impl Iterator<Item = &Edge>> {
        let out = self.outgoing.get(id).ok_or_else(|| not_found(id))?;
        Ok(out.values())
    }

    /// Distinct successor ids in first-edge order.
    pub fn successors(&self, id: &str) -> Result<Vec<&str>> {
        let out = self.outgoing.get(id).ok_or_else(|| not_found(id))?;
        let mut seen = IndexSet::new();
        for (target, _) in out.keys() {
            seen.insert(target.as_str());
        }
        Ok(seen.into_iter().collect())
    }

    /// Distinct predecessor ids.
    pub fn predecessors(&self, id: &str) -> Result<Vec<&str>> {
        let preds = self.incoming.get(id).ok_or_else(|| not_found(id))?;
        Ok(preds.iter().map(String::as_str).collect())
    }

    /// Successors followed by predecessors, deduplicated.
    pub fn neighbors(&self, id: &str) -> Result<Vec<&str>> {
        let mut all: IndexSet<&str> = self.successors(id)?.into_iter().collect();
        all.extend(self.predecessors(id)?);
        Ok(all.into_iter().collect())
    }

    /// Number of distinct predecessors.
    pub fn in_degree(&self, id: &str) -> Result<usize> {
        Ok(self.predecessors(id)?.len())
    }

    /// Number of distinct successors.
    pub fn out_degree(&self, id: &str) -> Result<usize> {
        Ok(self.successors(id)?.len())
    }

    pub fn degree(&self, id: &str) -> Result<usize> {
        Ok(self.in_degree(id)? + self.out_degree(id)?)
    }

    /// Every node reachable from `id` along directed edges, excluding `id`
    /// itself, in BFS order.
    pub fn descendants(&self, id: &str) -> Result<Vec<&str>> {
        self.require(id)?;
        let mut seen: IndexSet<&str> = IndexSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            for next in self.successors(current)? {
                if next != id && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        Ok(seen.into_iter().collect())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Directed density over distinct `(source, target)` pairs.
    pub fn density(&self) -> f64 {
        let n = self.node_count();
        if n < 2 {
            return 0.0;
        }
        let pairs: usize = self
            .outgoing
            .iter()
            .map(|(src, out)| {
                let mut targets: IndexSet<&str> = IndexSet::new();
                for (t, _) in out.keys() {
                    if t != src {
                        targets.insert(t.as_str());
                    }
                }
                targets.len()
            })
            .sum();
        pairs as f64 / (n * (n - 1)) as f64
    }

    /// Dense index snapshot for the algorithms.
    pub fn topology(&self) -> Topology {
        Topology::build(self)
    }

    pub(crate) fn require(&self, id: &str) -> Result<()> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }
}

fn not_found(id: &str) -> GraphError {
    GraphError::NodeNotFound {
        node_id: id.to_string(),
    }
}
