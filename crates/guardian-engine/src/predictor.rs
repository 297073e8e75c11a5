//! Pluggable risk predictors.
//!
//! A predictor supplies per-node risk and cascade amplification estimates.
//! The engine works without one; when one is configured and fails, the
//! caller logs a warning, marks its output degraded and carries on with the
//! built-in heuristics.

use std::collections::BTreeMap;

use thiserror::Error;

use guardian_graph::DependencyGraph;

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("Predictor unavailable: {0}")]
    Unavailable(String),

    #[error("Prediction failed: {0}")]
    Failed(String),
}

/// Node id → estimate.
pub type Predictions = BTreeMap<String, f64>;

/// Capability interface for learned or external risk models.
pub trait Predictor: Send + Sync {
    /// Risk in `[0, 1]` per node, replacing the stored `risk_score` as the
    /// starting point of base risk.
    fn predict_node_risk(&self, graph: &DependencyGraph) -> Result<Predictions, PredictorError>;

    /// Amplification in `[0, 1]` per node. Multiplies outgoing propagation
    /// probability by `1 + a` and replaces the reachability heuristic.
    fn predict_cascade_amplification(
        &self,
        graph: &DependencyGraph,
    ) -> Result<Predictions, PredictorError>;
}

/// Built-in predictor: stored risk scores and a reachability × tier
/// amplification estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPredictor;

impl Predictor for HeuristicPredictor {
    fn predict_node_risk(&self, graph: &DependencyGraph) -> Result<Predictions, PredictorError> {
        Ok(graph
            .nodes()
            .map(|n| (n.id.clone(), n.risk_score))
            .collect())
    }

    fn predict_cascade_amplification(
        &self,
        graph: &DependencyGraph,
    ) -> Result<Predictions, PredictorError> {
        graph
            .nodes()
            .map(|n| -> Result<(String, f64), PredictorError> {
                let reach = graph
                    .descendants(&n.id)
                    .map_err(|e| PredictorError::Failed(e.to_string()))?
                    .len();
                Ok((n.id.clone(), reachability_amplification(graph, reach, n.tier.value())))
            })
            .collect()
    }
}

/// `(reachable / max(1, V-1)) × (4 - tier) / 3`, clamped to `[0, 1]`.
pub fn reachability_amplification(graph: &DependencyGraph, reachable: usize, tier: u8) -> f64 {
    let others = graph.node_count().saturating_sub(1).max(1) as f64;
    let tier_factor = f64::from(4 - tier.min(3)) / 3.0;
    (reachable as f64 / others * tier_factor).clamp(0.0, 1.0)
}

/// Drop non-finite values and clamp the rest to `[0, 1]`.
pub fn sanitize(predictions: Predictions) -> Predictions {
    predictions
        .into_iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(k, v)| (k, v.clamp(0.0, 1.0)))
        .collect()
}

/// Outcome of querying an optional predictor.
#[derive(Debug, Clone, Default)]
pub(crate) struct PredictorOutput {
    pub values: Option<Predictions>,
    pub degraded: bool,
}

pub(crate) fn query(
    predictor: Option<&dyn Predictor>,
    what: &'static str,
    call: impl FnOnce(&dyn Predictor) -> Result<Predictions, PredictorError>,
) -> PredictorOutput {
    let Some(predictor) = predictor else {
        return PredictorOutput::default();
    };
    match call(predictor) {
        Ok(values) => PredictorOutput {
            values: Some(sanitize(values)),
            degraded: false,
        },
        Err(e) => {
            tracing::warn!(error = %e, prediction = what, "predictor failed, using heuristics");
            PredictorOutput {
                values: None,
                degraded: true,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Predictor that always errors.
    pub struct FailingPredictor;

    impl Predictor for FailingPredictor {
        fn predict_node_risk(&self, _: &DependencyGraph) -> Result<Predictions, PredictorError> {
            Err(PredictorError::Unavailable("model offline".into()))
        }

        fn predict_cascade_amplification(
            &self,
            _: &DependencyGraph,
        ) -> Result<Predictions, PredictorError> {
            Err(PredictorError::Unavailable("model offline".into()))
        }
    }

    /// Predictor returning fixed maps.
    pub struct FixedPredictor {
        pub risk: Predictions,
        pub amplification: Predictions,
    }

    impl Predictor for FixedPredictor {
        fn predict_node_risk(&self, _: &DependencyGraph) -> Result<Predictions, PredictorError> {
            Ok(self.risk.clone())
        }

        fn predict_cascade_amplification(
            &self,
            _: &DependencyGraph,
        ) -> Result<Predictions, PredictorError> {
            Ok(self.amplification.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::types::{Edge, EdgeType, Node, Tier};

    fn chain() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_node(Node::new("a", Tier::CRITICAL).with_risk_score(0.4))
            .unwrap();
        g.add_node(Node::new("b", Tier::STANDARD)).unwrap();
        g.add_node(Node::new("c", Tier::STANDARD)).unwrap();
        g.add_edge(Edge::new("a", "b", EdgeType::DependsOn)).unwrap();
        g.add_edge(Edge::new("b", "c", EdgeType::DependsOn)).unwrap();
        g
    }

    #[test]
    fn test_heuristic_amplification() {
        let g = chain();
        let amp = HeuristicPredictor.predict_cascade_amplification(&g).unwrap();
        // a reaches 2 of 2 others at tier 1: 1.0 × 3/3.
        assert!((amp["a"] - 1.0).abs() < 1e-12);
        // b reaches 1 of 2 at tier 3: 0.5 × 1/3.
        assert!((amp["b"] - 1.0 / 6.0).abs() < 1e-12);
        assert_eq!(amp["c"], 0.0);

        let risk = HeuristicPredictor.predict_node_risk(&g).unwrap();
        assert_eq!(risk["a"], 0.4);
    }

    #[test]
    fn test_sanitize_drops_bad_values() {
        let mut raw = Predictions::new();
        raw.insert("a".into(), f64::NAN);
        raw.insert("b".into(), 1.5);
        raw.insert("c".into(), -0.5);
        let clean = sanitize(raw);
        assert!(!clean.contains_key("a"));
        assert_eq!(clean["b"], 1.0);
        assert_eq!(clean["c"], 0.0);
    }

    #[test]
    fn test_query_reports_degradation() {
        let g = chain();
        let failing = testing::FailingPredictor;
        let out = query(Some(&failing), "node_risk", |p| p.predict_node_risk(&g));
        assert!(out.degraded);
        assert!(out.values.is_none());

        let none = query(None, "node_risk", |p| p.predict_node_risk(&g));
        assert!(!none.degraded);
        assert!(none.values.is_none());
    }
}
