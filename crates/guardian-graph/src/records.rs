//! Import/export records, fingerprinting and summary statistics.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use guardian_core::types::{Edge, EdgeCriticality, EdgeType, Node, NodeStatus};

use crate::error::Result;
use crate::graph::DependencyGraph;

/// A lightweight node record for persistence and visualisation consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub tier: u8,
    pub risk_score: f64,
    pub criticality_score: f64,
    pub category: String,
    pub status: NodeStatus,
}

/// A lightweight edge record for persistence and visualisation consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub category: String,
    pub strength: f64,
    pub criticality: EdgeCriticality,
}

/// Result of [`DependencyGraph::export`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

/// Full typed graph document, including profiles and metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Structural summary of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub average_degree: f64,
    pub connected_components: usize,
    pub tier_distribution: BTreeMap<u8, usize>,
    pub category_distribution: BTreeMap<String, usize>,
}

/// Borrowed view hashed for the fingerprint.
#[derive(Serialize)]
struct HashableGraph<'a> {
    nodes: Vec<&'a Node>,
    edges: Vec<&'a Edge>,
}

impl DependencyGraph {
    /// Export node and edge records in insertion order.
    pub fn export(&self) -> GraphExport {
        let nodes = self
            .nodes()
            .map(|n| NodeRecord {
                id: n.id.clone(),
                tier: n.tier.value(),
                risk_score: n.risk_score,
                criticality_score: n.criticality_score,
                category: n.category.clone(),
                status: n.status,
            })
            .collect();

        let edges = self
            .edges()
            .map(|e| EdgeRecord {
                source: e.source.clone(),
                target: e.target.clone(),
                edge_type: e.edge_type,
                category: e.category.clone(),
                strength: e.strength,
                criticality: e.criticality,
            })
            .collect();

        GraphExport { nodes, edges }
    }

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self.nodes().cloned().collect(),
            edges: self.edges().cloned().collect(),
        }
    }

    /// Build a graph from a document. All nodes are inserted before any
    /// edge, so edge order in the document does not matter.
    pub fn from_document(document: GraphDocument) -> Result<Self> {
        let mut graph = Self::new();
        for node in document.nodes {
            graph.add_node(node)?;
        }
        for edge in document.edges {
            graph.add_edge(edge)?;
        }
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph built from document"
        );
        Ok(graph)
    }

    /// BLAKE3 hex digest of the canonical JSON form of the graph.
    ///
    /// Two graphs with the same nodes, edges, attributes and insertion
    /// order share a fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let hashable = HashableGraph {
            nodes: self.nodes().collect(),
            edges: self.edges().collect(),
        };
        let json = serde_json::to_vec(&hashable)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }

    pub fn statistics(&self) -> GraphStatistics {
        let node_count = self.node_count();
        let topo = self.topology();

        let mut tier_distribution = BTreeMap::new();
        let mut category_distribution = BTreeMap::new();
        for node in self.nodes() {
            *tier_distribution.entry(node.tier.value()).or_insert(0) += 1;
            *category_distribution
                .entry(node.category.clone())
                .or_insert(0) += 1;
        }

        let average_degree = if node_count == 0 {
            0.0
        } else {
            (0..node_count).map(|i| topo.degree(i)).sum::<usize>() as f64 / node_count as f64
        };

        GraphStatistics {
            node_count,
            edge_count: self.edge_count(),
            density: self.density(),
            average_degree,
            connected_components: weak_components(&topo.undirected()),
            tier_distribution,
            category_distribution,
        }
    }
}

fn weak_components(adjacency: &[Vec<usize>]) -> usize {
    let mut seen = vec![false; adjacency.len()];
    let mut components = 0;
    for start in 0..adjacency.len() {
        if seen[start] {
            continue;
        }
        components += 1;
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &next in &adjacency[node] {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphError;
    use guardian_core::types::Tier;

    fn sample() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_node(Node::new("idp", Tier::CRITICAL).with_category("identity"))
            .unwrap();
        g.add_node(Node::new("crm", Tier::IMPORTANT).with_category("saas"))
            .unwrap();
        g.add_node(Node::new("print", Tier::STANDARD).with_category("saas"))
            .unwrap();
        g.add_edge(
            Edge::new("idp", "crm", EdgeType::IntegratesWith)
                .with_category("authentication")
                .with_strength(0.9),
        )
        .unwrap();
        g
    }

    #[test]
    fn test_export_records() {
        let export = sample().export();
        assert_eq!(export.nodes.len(), 3);
        assert_eq!(export.nodes[0].tier, 1);
        assert_eq!(export.edges[0].strength, 0.9);

        let json = serde_json::to_value(&export.edges[0]).unwrap();
        assert_eq!(json["type"], "integrates_with");
        assert_eq!(json["criticality"], "medium");
    }

    #[test]
    fn test_document_roundtrip_preserves_fingerprint() {
        let g = sample();
        let json = serde_json::to_string(&g.to_document()).unwrap();
        let doc: GraphDocument = serde_json::from_str(&json).unwrap();
        let rebuilt = DependencyGraph::from_document(doc).unwrap();
        assert_eq!(g.fingerprint().unwrap(), rebuilt.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_attributes() {
        let g = sample();
        let mut changed = g.clone();
        changed
            .add_node(Node::new("print", Tier::STANDARD).with_risk_score(0.5))
            .unwrap();
        assert_ne!(g.fingerprint().unwrap(), changed.fingerprint().unwrap());
    }

    #[test]
    fn test_dangling_edge_in_document_rejected() {
        let doc = GraphDocument {
            nodes: vec![Node::new("a", Tier::STANDARD)],
            edges: vec![Edge::new("a", "ghost", EdgeType::DependsOn)],
        };
        assert!(matches!(
            DependencyGraph::from_document(doc),
            Err(GraphError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn test_statistics() {
        let stats = sample().statistics();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.connected_components, 2);
        assert_eq!(stats.tier_distribution[&1], 1);
        assert_eq!(stats.category_distribution["saas"], 2);
        assert!((stats.average_degree - 2.0 / 3.0).abs() < 1e-12);
    }
}
