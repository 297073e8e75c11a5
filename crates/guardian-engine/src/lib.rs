//! guardian-engine: Cascade simulation and risk analysis for vendor dependency graphs.
//!
//! Runs seeded stochastic compromise cascades, scores every vendor on base,
//! structural, cascade and centrality risk, and searches for the structural
//! changes that most reduce propagation paths. All analyses are synchronous
//! and read-only on the caller's graph.

pub mod cascade;
pub mod error;
pub mod mitigation;
pub mod paths;
pub mod predictor;
pub mod scoring;
pub mod stats;
pub mod structural;
pub mod trend;
pub mod types;

pub use error::EngineError;
pub use predictor::{HeuristicPredictor, Predictor, PredictorError};
pub use types::{AssessmentReport, MitigationReport, RiskAssessment, SimulationResult};

use std::sync::Arc;

use guardian_core::EngineConfig;
use guardian_graph::DependencyGraph;

use crate::error::Result;
use crate::structural::CancelToken;
use crate::types::StructuralAnalysis;

/// The main analysis engine: a configuration plus an optional predictor.
#[derive(Clone, Default)]
pub struct RiskEngine {
    config: EngineConfig,
    predictor: Option<Arc<dyn Predictor>>,
}

impl RiskEngine {
    /// Create an engine with default configuration and no predictor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Plug in a risk predictor.
    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn predictor(&self) -> Option<&dyn Predictor> {
        self.predictor.as_deref()
    }

    /// Centrality, single points of failure and bridges.
    pub fn analyze_structure(&self, graph: &DependencyGraph) -> StructuralAnalysis {
        let cancel = CancelToken::from_config(&self.config.structural);
        structural::analyze(graph, &self.config.structural, &cancel)
    }

    /// Seeded cascade from `initial_compromised`.
    pub fn run_simulation<S: AsRef<str>>(
        &self,
        graph: &DependencyGraph,
        initial_compromised: &[S],
        seed: u64,
    ) -> Result<SimulationResult> {
        self.config.validate()?;
        cascade::run_simulation(
            graph,
            initial_compromised,
            seed,
            &self.config.simulation,
            self.predictor(),
        )
    }

    pub fn calculate_comprehensive_risk(&self, graph: &DependencyGraph) -> Result<RiskAssessment> {
        scoring::calculate_comprehensive_risk(graph, self.predictor(), &self.config)
    }

    /// Ranked mitigations for a simulation previously run on `graph`.
    pub fn generate_mitigations(
        &self,
        graph: &DependencyGraph,
        simulation: &SimulationResult,
    ) -> Result<MitigationReport> {
        mitigation::generate_mitigations(graph, simulation, self.predictor(), &self.config)
    }

    /// Simulation, risk assessment and mitigations in one report.
    pub fn assess<S: AsRef<str>>(
        &self,
        graph: &DependencyGraph,
        initial_compromised: &[S],
        seed: u64,
    ) -> Result<AssessmentReport> {
        let simulation = self.run_simulation(graph, initial_compromised, seed)?;
        let risk = self.calculate_comprehensive_risk(graph)?;
        let mitigations = self.generate_mitigations(graph, &simulation)?;
        Ok(AssessmentReport {
            simulation,
            risk,
            mitigations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::types::{Edge, EdgeType, Node, Tier};

    fn chain() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for id in ["idp", "crm", "billing"] {
            g.add_node(Node::new(id, Tier::IMPORTANT)).unwrap();
        }
        g.add_edge(Edge::new("idp", "crm", EdgeType::DependsOn).with_strength(0.9))
            .unwrap();
        g.add_edge(Edge::new("crm", "billing", EdgeType::Supplies).with_strength(0.4))
            .unwrap();
        g
    }

    #[test]
    fn test_assess_links_reports() {
        let engine = RiskEngine::new();
        let g = chain();
        let report = engine.assess(&g, &["idp"], 5).unwrap();
        assert_eq!(
            report.mitigations.simulation_id,
            report.simulation.simulation_id
        );
        assert_eq!(report.risk.profiles.len(), 3);
    }

    #[test]
    fn test_engine_uses_predictor() {
        let engine = RiskEngine::new().with_predictor(Arc::new(HeuristicPredictor));
        let result = engine.run_simulation(&chain(), &["idp"], 5).unwrap();
        assert!(!result.degraded);
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.risk.weights.centrality = 0.5;
        let engine = RiskEngine::new().with_config(config);
        assert!(engine.run_simulation(&chain(), &["idp"], 1).is_err());
        assert!(engine.calculate_comprehensive_risk(&chain()).is_err());
    }

    #[test]
    fn test_structure_through_engine() {
        let analysis = RiskEngine::new().analyze_structure(&chain());
        assert_eq!(analysis.single_points_of_failure, vec!["crm"]);
    }
}
