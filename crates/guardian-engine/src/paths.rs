//! Simple-path enumeration over the dependency graph.
//!
//! Three flavours: plain enumeration from a source set, used to describe how
//! far a compromise can reach structurally; a counting DFS over the same
//! paths, used to measure mitigation impact; and risk-scored DFS from a
//! single node used by the risk scorer.

use std::collections::HashMap;

use guardian_graph::{DependencyGraph, Topology};

use crate::types::ScoredPath;

/// Result of [`enumerate_paths`].
#[derive(Debug, Clone, Default)]
pub struct PathEnumeration {
    /// Node indices along each path, source first. Every path has at least
    /// one edge.
    pub paths: Vec<Vec<usize>>,
    /// The path cap stopped the search early.
    pub truncated: bool,
}

impl PathEnumeration {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Longest path, in edges.
    pub fn max_length(&self) -> usize {
        self.paths.iter().map(|p| p.len() - 1).max().unwrap_or(0)
    }

    pub fn to_ids(&self, topo: &Topology) -> Vec<Vec<String>> {
        self.paths
            .iter()
            .map(|p| p.iter().map(|&i| topo.ids[i].clone()).collect())
            .collect()
    }
}

/// Enumerate every simple path of 1..=`max_depth` edges starting at any of
/// `sources`, stopping once `max_paths` paths are collected.
///
/// Every prefix counts as its own path, so removing any node or edge that
/// lies on some path strictly lowers the count. Output order is stable: by
/// source, then depth-first in adjacency order.
pub fn enumerate_paths(
    topo: &Topology,
    sources: &[usize],
    max_depth: usize,
    max_paths: usize,
) -> PathEnumeration {
    let mut result = PathEnumeration::default();

    for &source in sources {
        let mut stack: Vec<DfsState> = vec![DfsState {
            path_nodes: vec![source],
        }];

        while let Some(state) = stack.pop() {
            let node = state.node();
            let depth = state.path_nodes.len() - 1;
            if depth >= max_depth {
                continue;
            }

            let mut children = Vec::new();
            for &next in &topo.out[node] {
                if state.path_nodes.contains(&next) {
                    continue;
                }
                if result.paths.len() >= max_paths {
                    result.truncated = true;
                    return result;
                }

                let mut path_nodes = state.path_nodes.clone();
                path_nodes.push(next);
                result.paths.push(path_nodes.clone());
                children.push(DfsState { path_nodes });
            }

            // Reverse so the first neighbour is explored first.
            stack.extend(children.into_iter().rev());
        }
    }

    result
}

/// Result of [`count_paths`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathCount {
    pub count: usize,
    /// The budget stopped the count early; `count` is a lower bound.
    pub truncated: bool,
}

/// Count the paths [`enumerate_paths`] would produce without storing them,
/// stopping once `budget` paths are counted.
pub fn count_paths(
    topo: &Topology,
    sources: &[usize],
    max_depth: usize,
    budget: usize,
) -> PathCount {
    let mut result = PathCount::default();
    let mut on_path = vec![false; topo.ids.len()];

    for &source in sources {
        on_path[source] = true;
        // (node, depth, next child to try)
        let mut stack: Vec<(usize, usize, usize)> = vec![(source, 0, 0)];

        while let Some(frame) = stack.last_mut() {
            let (node, depth, cursor) = *frame;
            if depth >= max_depth || cursor >= topo.out[node].len() {
                on_path[node] = false;
                stack.pop();
                continue;
            }
            frame.2 += 1;

            let next = topo.out[node][cursor];
            if on_path[next] {
                continue;
            }
            if result.count >= budget {
                result.truncated = true;
                return result;
            }
            result.count += 1;
            on_path[next] = true;
            stack.push((next, depth + 1, 0));
        }
    }

    result
}

/// Internal DFS state.
struct DfsState {
    path_nodes: Vec<usize>,
}

impl DfsState {
    fn node(&self) -> usize {
        self.path_nodes[self.path_nodes.len() - 1]
    }
}

/// Risk-scored DFS over one graph.
///
/// Path risk starts at the source's stored risk score and is multiplied at
/// each hop by `strength × (1 + target.risk_score)`, using the strongest edge
/// between a pair. Scores are capped at 1. Per-node risk and edge strengths
/// are built once and shared by every source.
pub struct PathScorer<'a> {
    topo: &'a Topology,
    risk: Vec<f64>,
    strengths: HashMap<(usize, usize), f64>,
}

impl<'a> PathScorer<'a> {
    pub fn new(graph: &DependencyGraph, topo: &'a Topology) -> Self {
        let risk = topo
            .ids
            .iter()
            .map(|id| graph.node(id).map_or(0.0, |n| n.risk_score))
            .collect();
        Self {
            topo,
            risk,
            strengths: strongest_edges(graph, topo),
        }
    }

    /// Paths of up to `max_depth` edges from `source`, sorted highest risk
    /// first, keeping at most `limit`. The search stops after `max_paths`
    /// expansions.
    pub fn paths_from(
        &self,
        source: usize,
        max_depth: usize,
        limit: usize,
        max_paths: usize,
    ) -> ScoredPaths {
        let topo = self.topo;
        let mut best: Vec<(Vec<usize>, f64)> = Vec::new();
        let mut expanded = 0usize;
        let mut truncated = false;
        let mut stack: Vec<(Vec<usize>, f64)> = vec![(vec![source], self.risk[source])];

        'search: while let Some((path, acc)) = stack.pop() {
            if path.len() > max_depth {
                continue;
            }
            let node = path[path.len() - 1];
            for &next in topo.out[node].iter().rev() {
                if path.contains(&next) {
                    continue;
                }
                if expanded >= max_paths {
                    truncated = true;
                    break 'search;
                }
                expanded += 1;

                let strength = self.strengths.get(&(node, next)).copied().unwrap_or(0.0);
                let next_risk = acc * strength * (1.0 + self.risk[next]);
                let mut next_path = path.clone();
                next_path.push(next);
                if limit > 0 {
                    best.push((next_path.clone(), next_risk));
                    if best.len() >= limit.saturating_mul(2) {
                        keep_top(&mut best, limit);
                    }
                }
                stack.push((next_path, next_risk));
            }
        }

        keep_top(&mut best, limit);
        ScoredPaths {
            paths: best
                .into_iter()
                .map(|(path, risk)| ScoredPath {
                    nodes: path.iter().map(|&i| topo.ids[i].clone()).collect(),
                    risk: risk.min(1.0),
                })
                .collect(),
            truncated,
        }
    }
}

/// Result of [`PathScorer::paths_from`].
#[derive(Debug, Clone, Default)]
pub struct ScoredPaths {
    pub paths: Vec<ScoredPath>,
    /// The expansion budget stopped the search early.
    pub truncated: bool,
}

/// Stable sort by risk, highest first, then drop everything past `limit`.
fn keep_top(paths: &mut Vec<(Vec<usize>, f64)>, limit: usize) {
    paths.sort_by(|a, b| b.1.total_cmp(&a.1));
    paths.truncate(limit);
}

fn strongest_edges(graph: &DependencyGraph, topo: &Topology) -> HashMap<(usize, usize), f64> {
    let mut strengths: HashMap<(usize, usize), f64> = HashMap::new();
    for edge in graph.edges() {
        if let (Some(s), Some(t)) = (topo.index_of(&edge.source), topo.index_of(&edge.target)) {
            let entry = strengths.entry((s, t)).or_insert(0.0);
            *entry = entry.max(edge.strength);
        }
    }
    strengths
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::types::{Edge, EdgeType, Node, Tier};

    /// A→B, A→C, B→D, C→D.
    fn diamond() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (id, risk) in [("a", 0.5), ("b", 0.2), ("c", 0.8), ("d", 0.0)] {
            g.add_node(Node::new(id, Tier::STANDARD).with_risk_score(risk))
                .unwrap();
        }
        for (s, t, strength) in [("a", "b", 0.5), ("a", "c", 1.0), ("b", "d", 1.0), ("c", "d", 1.0)] {
            g.add_edge(Edge::new(s, t, EdgeType::DependsOn).with_strength(strength))
                .unwrap();
        }
        g
    }

    #[test]
    fn test_enumerate_counts_every_prefix() {
        let g = diamond();
        let topo = g.topology();
        let result = enumerate_paths(&topo, &[0], 2, 100);
        // a→b, a→c, a→b→d, a→c→d
        assert_eq!(result.len(), 4);
        assert_eq!(result.max_length(), 2);
        assert!(!result.truncated);

        let ids = result.to_ids(&topo);
        assert_eq!(ids[0], vec!["a", "b"]);
        assert!(ids.contains(&vec!["a".to_string(), "c".to_string(), "d".to_string()]));
    }

    #[test]
    fn test_depth_limit() {
        let topo = diamond().topology();
        assert_eq!(enumerate_paths(&topo, &[0], 1, 100).len(), 2);
        assert_eq!(enumerate_paths(&topo, &[0], 0, 100).len(), 0);
    }

    #[test]
    fn test_cycle_detection() {
        let mut g = diamond();
        g.add_edge(Edge::new("d", "a", EdgeType::DependsOn)).unwrap();
        let topo = g.topology();
        let result = enumerate_paths(&topo, &[0], 10, 1000);
        for path in &result.paths {
            let mut seen = path.clone();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), path.len(), "path revisits a node: {path:?}");
        }
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_path_cap_truncates() {
        let topo = diamond().topology();
        let result = enumerate_paths(&topo, &[0], 3, 3);
        assert_eq!(result.len(), 3);
        assert!(result.truncated);
    }

    #[test]
    fn test_count_matches_enumeration() {
        let mut g = diamond();
        g.add_edge(Edge::new("d", "a", EdgeType::DependsOn)).unwrap();
        let topo = g.topology();
        for depth in 0..5 {
            let listed = enumerate_paths(&topo, &[0, 3], depth, usize::MAX).len();
            let counted = count_paths(&topo, &[0, 3], depth, usize::MAX);
            assert_eq!(counted.count, listed, "depth {depth}");
            assert!(!counted.truncated);
        }

        let capped = count_paths(&topo, &[0], 3, 2);
        assert_eq!(capped, PathCount { count: 2, truncated: true });
    }

    #[test]
    fn test_scored_paths() {
        let g = diamond();
        let topo = g.topology();
        let scorer = PathScorer::new(&g, &topo);
        let result = scorer.paths_from(0, 3, 20, 1000);
        assert!(!result.truncated);
        let paths = result.paths;
        assert_eq!(paths.len(), 4);
        // a→c: 0.5 × 1.0 × 1.8 = 0.9 is the riskiest single hop.
        assert_eq!(paths[0].nodes, vec!["a", "c"]);
        assert!((paths[0].risk - 0.9).abs() < 1e-12);
        // a→b→d: 0.5 × 0.5 × 1.2 × 1.0 × 1.0 = 0.3
        let abd = paths.iter().find(|p| p.nodes == ["a", "b", "d"]).unwrap();
        assert!((abd.risk - 0.3).abs() < 1e-12);

        let top_two = scorer.paths_from(0, 3, 2, 1000).paths;
        assert_eq!(top_two.len(), 2);
        assert_eq!(top_two[0].nodes, vec!["a", "c"]);
    }

    #[test]
    fn test_scored_paths_stop_at_expansion_budget() {
        let mut g = DependencyGraph::new();
        let n = 12;
        for i in 0..n {
            g.add_node(Node::new(format!("k{i}"), Tier::STANDARD).with_risk_score(0.5))
                .unwrap();
        }
        for s in 0..n {
            for t in 0..n {
                if s != t {
                    g.add_edge(Edge::new(format!("k{s}"), format!("k{t}"), EdgeType::DependsOn))
                        .unwrap();
                }
            }
        }
        let topo = g.topology();
        let scorer = PathScorer::new(&g, &topo);

        // 11 + 11·10 + 11·10·9 = 1111 paths of up to three hops.
        let full = scorer.paths_from(0, 3, 5, usize::MAX);
        assert!(!full.truncated);
        assert_eq!(full.paths.len(), 5);

        let capped = scorer.paths_from(0, 3, 5, 50);
        assert!(capped.truncated);
        assert_eq!(capped.paths.len(), 5);
        assert!(scorer.paths_from(0, 3, 0, 50).paths.is_empty());
    }
}
