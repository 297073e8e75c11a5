//! Result types returned by the engine entry points.
//!
//! Every map is a `BTreeMap` so serialized output is byte-stable for a given
//! input and seed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use guardian_core::types::{
    ActionType, Complexity, EdgeType, NodeStatus, RiskFactor, RiskLevel,
};

// ── Structural ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityMetric {
    Degree,
    Betweenness,
    Closeness,
    PageRank,
    Eigenvector,
}

/// Centrality scores of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeCentrality {
    pub degree: f64,
    pub betweenness: f64,
    pub closeness: f64,
    pub pagerank: f64,
    pub eigenvector: f64,
}

/// Output of the structural analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuralAnalysis {
    pub centrality: BTreeMap<String, NodeCentrality>,
    /// Articulation points of the underlying undirected graph.
    pub single_points_of_failure: Vec<String>,
    /// Endpoints of bridges of the underlying undirected graph.
    pub bridge_nodes: Vec<String>,
    /// Nodes whose total degree reaches the high-degree percentile.
    pub high_degree_nodes: Vec<String>,
    /// Metrics replaced by degree centrality.
    pub degraded_metrics: Vec<CentralityMetric>,
}

impl StructuralAnalysis {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_metrics.is_empty()
    }
}

// ── Simulation ────────────────────────────────────────────────────

/// Why a simulation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A wave compromised nothing new.
    Natural,
    WaveBudget,
    TimeBudget,
}

/// An edge that carried a compromise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationEdge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    pub category: String,
    pub probability: f64,
    pub delay: f64,
    /// Simulated time at which the compromise arrived over this edge.
    pub arrival: f64,
}

/// Nodes newly compromised in one wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationWave {
    /// 1-based wave number.
    pub index: usize,
    pub newly_compromised: Vec<String>,
    /// Simulation clock at the end of the wave.
    pub timestamp: f64,
    pub edges: Vec<PropagationEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckNode {
    pub node_id: String,
    /// Appearances as either endpoint of a propagation edge.
    pub appearances: usize,
}

/// Aggregate numbers for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    pub total_nodes: usize,
    pub compromised_count: usize,
    pub affected_count: usize,
    pub compromise_rate: f64,
    pub impact_rate: f64,
    /// Compromised nodes beyond the initial set.
    pub blast_radius: usize,
    /// Number of waves.
    pub cascade_depth: usize,
    pub elapsed_time: f64,
    pub average_propagation_time: f64,
    /// Compromised nodes per thousand simulated time units.
    pub propagation_efficiency: f64,
    pub tier_impact: BTreeMap<u8, usize>,
    pub category_impact: BTreeMap<String, usize>,
    /// Propagation edges touching a tier 1 or tier 2 node.
    pub critical_path_count: usize,
    /// Nodes each initial node reached through the used propagation edges.
    pub initial_node_impact: BTreeMap<String, usize>,
    pub bottleneck_nodes: Vec<BottleneckNode>,
    /// Size of the largest wave.
    pub largest_wave: usize,
    /// New compromises per thousand time units, per wave.
    pub propagation_velocity: Vec<f64>,
}

/// Outcome of one cascade simulation. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Derived from graph fingerprint, seed and initial set.
    pub simulation_id: Uuid,
    pub seed: u64,
    pub graph_fingerprint: String,
    pub initial_compromised: Vec<String>,
    /// Initial nodes first, then each wave's nodes in order.
    pub final_compromised: Vec<String>,
    /// Compromised nodes plus their secure direct successors.
    pub affected: Vec<String>,
    pub waves: Vec<PropagationWave>,
    pub final_status: BTreeMap<String, NodeStatus>,
    pub metrics: SimulationMetrics,
    pub termination: Termination,
    /// A budget stopped the run while propagation was still possible.
    pub budget_exceeded: bool,
    /// The predictor failed and the run used unblended probabilities.
    pub degraded: bool,
    /// Simple paths from the initial set, node ids in order.
    pub propagation_paths: Vec<Vec<String>>,
    pub max_path_length: usize,
    pub paths_truncated: bool,
}

impl SimulationResult {
    pub fn is_compromised(&self, node_id: &str) -> bool {
        self.final_compromised.iter().any(|n| n == node_id)
    }
}

// ── Risk ──────────────────────────────────────────────────────────

/// Per-node risk decomposition. Recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRiskProfile {
    pub node_id: String,
    pub tier: u8,
    pub base_risk: f64,
    pub structural_risk: f64,
    pub cascade_amplification: f64,
    pub centrality_risk: f64,
    pub combined_risk: f64,
    pub risk_level: RiskLevel,
    pub contributing_factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResilienceBreakdown {
    pub redundancy: f64,
    pub evenness: f64,
    pub connectivity: f64,
    pub tier_diversity: f64,
}

/// Network-wide risk aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub overall_score: f64,
    pub tier_1_exposure: f64,
    pub cascade_potential: f64,
    pub single_point_failures: usize,
    pub critical_path_count: usize,
    pub vulnerability_density: f64,
    pub resilience_score: f64,
    pub resilience: ResilienceBreakdown,
    pub degraded_metrics: Vec<CentralityMetric>,
    /// The predictor failed and heuristics were used.
    pub predictor_degraded: bool,
}

/// A DFS path scored by accumulated risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPath {
    pub nodes: Vec<String>,
    pub risk: f64,
}

/// Output of the risk scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub metrics: RiskMetrics,
    pub profiles: BTreeMap<String, NodeRiskProfile>,
    /// Scored paths above the critical threshold, highest risk first.
    pub critical_paths: Vec<ScoredPath>,
}

/// A cluster of high-risk nodes within a few hops of each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskHotspot {
    pub center: String,
    pub nodes: Vec<String>,
    pub average_risk: f64,
}

/// Change in network aggregates after hardening a set of nodes. Positive
/// values are improvements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardeningImpact {
    pub overall_risk_reduction: f64,
    pub cascade_reduction: f64,
    pub vulnerability_reduction: f64,
    pub resilience_improvement: f64,
}

// ── Mitigation ────────────────────────────────────────────────────

/// A structural intervention and its counterfactual effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationCandidate {
    pub action: ActionType,
    /// Node id, or `source→target` for edges.
    pub target: String,
    pub risk_reduction: f64,
    pub paths_reduced: usize,
    /// Appearances of the target in the baseline propagation paths.
    pub path_frequency: usize,
    pub feasible: bool,
    pub implementation_complexity: Complexity,
    pub description: String,
    pub trade_offs: Vec<String>,
    /// Final compromised count of the same-seed re-run on the modified graph.
    pub compromised_after: Option<usize>,
}

/// A generic hardening recommendation independent of graph shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardeningTemplate {
    pub category: String,
    pub title: String,
    pub description: String,
    /// Nominal risk reduction in percent.
    pub risk_reduction: u8,
    pub relative_cost: Complexity,
}

/// Output of the mitigation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationReport {
    pub simulation_id: Uuid,
    /// Feasible candidates with a positive reduction, best first.
    pub ranked: Vec<MitigationCandidate>,
    /// Every evaluated candidate in generation order.
    pub evaluated: Vec<MitigationCandidate>,
    pub original_path_count: usize,
    /// The baseline count hit `mitigation.max_counted_paths`, so
    /// `original_path_count` and every reduction are lower bounds.
    #[serde(default)]
    pub paths_truncated: bool,
    pub evaluation_depth: usize,
    /// Sum of per-candidate reductions. Overlapping candidates are double
    /// counted, so this over-estimates what applying all of them achieves.
    pub total_paths_reducible_upper_bound: usize,
    pub hardening: Vec<HardeningTemplate>,
}

/// Simulation, risk and mitigations for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub simulation: SimulationResult,
    pub risk: RiskAssessment,
    pub mitigations: MitigationReport,
}
