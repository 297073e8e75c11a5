//! Counterfactual mitigation search.
//!
//! Candidates come from the structural propagation paths of a baseline
//! simulation: the nodes and edges that appear on the most paths. Each one
//! is applied to its own clone of the graph and the paths from the same
//! initial set are re-counted, so the reduction is measured against an
//! untouched baseline. Candidates are independent and may be evaluated in
//! parallel.

use std::collections::{BTreeMap, HashSet};

use rayon::prelude::*;

use guardian_core::config::EngineConfig;
use guardian_core::types::{edge_label, ActionType, Complexity};
use guardian_graph::DependencyGraph;

use crate::cascade::run_simulation;
use crate::error::{EngineError, Result};
use crate::paths::count_paths;
use crate::predictor::Predictor;
use crate::types::{HardeningTemplate, MitigationCandidate, MitigationReport, SimulationResult};

/// A structural change to try.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Isolate(String),
    RemoveEdge { source: String, target: String },
}

impl Action {
    fn action_type(&self) -> ActionType {
        match self {
            Self::Isolate(_) => ActionType::IsolateNode,
            Self::RemoveEdge { .. } => ActionType::RemoveEdge,
        }
    }

    fn target(&self) -> String {
        match self {
            Self::Isolate(id) => id.clone(),
            Self::RemoveEdge { source, target } => edge_label(source, target),
        }
    }

    /// Apply to a private clone.
    fn apply(&self, graph: &mut DependencyGraph, initial: &HashSet<&str>) -> Result<()> {
        match self {
            Self::Isolate(id) => {
                if initial.contains(id.as_str()) {
                    return Err(EngineError::InvalidRequest(format!(
                        "{id} is in the initial compromised set"
                    )));
                }
                graph.remove_node(id)?;
            }
            Self::RemoveEdge { source, target } => {
                graph.remove_edge(source, target)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    action: Action,
    frequency: usize,
}

/// Generate, evaluate and rank mitigations for a baseline simulation.
///
/// `simulation` must come from `graph`; a result computed on a different
/// graph is rejected.
pub fn generate_mitigations(
    graph: &DependencyGraph,
    simulation: &SimulationResult,
    predictor: Option<&dyn Predictor>,
    config: &EngineConfig,
) -> Result<MitigationReport> {
    config.validate()?;
    if graph.fingerprint()? != simulation.graph_fingerprint {
        return Err(EngineError::InvalidRequest(
            "simulation was run on a different graph".into(),
        ));
    }

    let settings = &config.mitigation;
    let topo = graph.topology();
    let initial_idx: Vec<usize> = simulation
        .initial_compromised
        .iter()
        .map(|id| {
            topo.index_of(id).ok_or_else(|| EngineError::NodeNotFound {
                node_id: id.clone(),
            })
        })
        .collect::<Result<_>>()?;

    let evaluation_depth =
        (simulation.max_path_length + 1).max(settings.min_evaluation_depth);
    let baseline = count_paths(
        &topo,
        &initial_idx,
        evaluation_depth,
        settings.max_counted_paths,
    );
    let original_path_count = baseline.count;
    if baseline.truncated {
        tracing::warn!(
            simulation_id = %simulation.simulation_id,
            budget = settings.max_counted_paths,
            evaluation_depth,
            "Baseline path count hit its budget; reductions are lower bounds"
        );
    }

    let candidates = select_candidates(simulation, config);
    tracing::debug!(
        candidates = candidates.len(),
        original_path_count,
        evaluation_depth,
        "evaluating mitigation candidates"
    );

    let evaluate = |candidate: &Candidate| {
        evaluate_candidate(
            graph,
            simulation,
            candidate,
            original_path_count,
            evaluation_depth,
            predictor,
            config,
        )
    };
    let evaluated: Vec<MitigationCandidate> = if settings.parallel {
        candidates.par_iter().map(evaluate).collect()
    } else {
        candidates.iter().map(evaluate).collect()
    };

    let mut ranked: Vec<MitigationCandidate> = evaluated
        .iter()
        .filter(|c| c.feasible && c.risk_reduction > 0.0)
        .cloned()
        .collect();
    ranked.sort_by(|a, b| {
        b.risk_reduction
            .total_cmp(&a.risk_reduction)
            .then_with(|| b.paths_reduced.cmp(&a.paths_reduced))
            .then_with(|| a.implementation_complexity.cmp(&b.implementation_complexity))
            .then_with(|| a.target.cmp(&b.target))
    });

    let total_paths_reducible_upper_bound = evaluated
        .iter()
        .filter(|c| c.feasible)
        .map(|c| c.paths_reduced)
        .sum();

    tracing::info!(
        simulation_id = %simulation.simulation_id,
        evaluated = evaluated.len(),
        ranked = ranked.len(),
        original_path_count,
        "mitigation search complete"
    );

    Ok(MitigationReport {
        simulation_id: simulation.simulation_id,
        ranked,
        evaluated,
        original_path_count,
        paths_truncated: baseline.truncated,
        evaluation_depth,
        total_paths_reducible_upper_bound,
        hardening: hardening_catalogue(),
    })
}

/// Top-K nodes and top-K edges by appearances in the baseline paths.
/// A path's source and the initial nodes are never node candidates.
fn select_candidates(simulation: &SimulationResult, config: &EngineConfig) -> Vec<Candidate> {
    let settings = &config.mitigation;
    let initial: HashSet<&str> = simulation
        .initial_compromised
        .iter()
        .map(String::as_str)
        .collect();

    let mut node_freq: BTreeMap<&str, usize> = BTreeMap::new();
    let mut edge_freq: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for path in &simulation.propagation_paths {
        for id in path.iter().skip(1) {
            if !initial.contains(id.as_str()) {
                *node_freq.entry(id.as_str()).or_insert(0) += 1;
            }
        }
        for pair in path.windows(2) {
            *edge_freq
                .entry((pair[0].as_str(), pair[1].as_str()))
                .or_insert(0) += 1;
        }
    }

    let mut nodes: Vec<(&str, usize)> = node_freq.into_iter().collect();
    // Stable: equal counts stay in id order.
    nodes.sort_by(|a, b| b.1.cmp(&a.1));
    let mut edges: Vec<((&str, &str), usize)> = edge_freq.into_iter().collect();
    edges.sort_by(|a, b| b.1.cmp(&a.1));

    nodes
        .into_iter()
        .take(settings.top_k_nodes)
        .map(|(id, frequency)| Candidate {
            action: Action::Isolate(id.to_string()),
            frequency,
        })
        .chain(
            edges
                .into_iter()
                .take(settings.top_k_edges)
                .map(|((s, t), frequency)| Candidate {
                    action: Action::RemoveEdge {
                        source: s.to_string(),
                        target: t.to_string(),
                    },
                    frequency,
                }),
        )
        .take(settings.max_candidates)
        .collect()
}

fn evaluate_candidate(
    graph: &DependencyGraph,
    simulation: &SimulationResult,
    candidate: &Candidate,
    original_path_count: usize,
    evaluation_depth: usize,
    predictor: Option<&dyn Predictor>,
    config: &EngineConfig,
) -> MitigationCandidate {
    let (description, trade_offs) = describe(graph, &candidate.action);
    let mut result = MitigationCandidate {
        action: candidate.action.action_type(),
        target: candidate.action.target(),
        risk_reduction: 0.0,
        paths_reduced: 0,
        path_frequency: candidate.frequency,
        feasible: false,
        implementation_complexity: complexity(graph, &candidate.action),
        description,
        trade_offs,
        compromised_after: None,
    };

    match counterfactual(graph, simulation, candidate, evaluation_depth, predictor, config) {
        Ok((path_count, compromised_after)) => {
            let paths_reduced = original_path_count.saturating_sub(path_count);
            result.feasible = true;
            result.paths_reduced = paths_reduced;
            result.risk_reduction = if original_path_count == 0 {
                0.0
            } else {
                paths_reduced as f64 / original_path_count as f64
            };
            result.compromised_after = compromised_after;
        }
        Err(e) => {
            tracing::warn!(
                target = %result.target,
                action = ?result.action,
                error = %e,
                "mitigation candidate infeasible"
            );
        }
    }
    result
}

/// Path count and optional same-seed compromised count on the modified clone.
fn counterfactual(
    graph: &DependencyGraph,
    simulation: &SimulationResult,
    candidate: &Candidate,
    evaluation_depth: usize,
    predictor: Option<&dyn Predictor>,
    config: &EngineConfig,
) -> Result<(usize, Option<usize>)> {
    let initial: HashSet<&str> = simulation
        .initial_compromised
        .iter()
        .map(String::as_str)
        .collect();

    let mut modified = graph.clone();
    candidate.action.apply(&mut modified, &initial)?;

    let topo = modified.topology();
    let sources: Vec<usize> = simulation
        .initial_compromised
        .iter()
        .filter_map(|id| topo.index_of(id))
        .collect();
    let path_count = count_paths(
        &topo,
        &sources,
        evaluation_depth,
        config.mitigation.max_counted_paths,
    )
    .count;

    let compromised_after = if config.mitigation.resimulate {
        let rerun = run_simulation(
            &modified,
            &simulation.initial_compromised,
            simulation.seed,
            &config.simulation,
            predictor,
        )?;
        Some(rerun.final_compromised.len())
    } else {
        None
    };

    Ok((path_count, compromised_after))
}

/// Isolating a node costs more the more relationships it carries.
fn complexity(graph: &DependencyGraph, action: &Action) -> Complexity {
    match action {
        Action::Isolate(id) => match graph.degree(id) {
            Ok(0..=2) => Complexity::Low,
            Ok(3..=5) => Complexity::Medium,
            _ => Complexity::High,
        },
        Action::RemoveEdge { .. } => Complexity::Low,
    }
}

fn describe(graph: &DependencyGraph, action: &Action) -> (String, Vec<String>) {
    match action {
        Action::Isolate(id) => {
            let links = graph.degree(id).unwrap_or(0);
            (
                format!("Isolate {id} from the vendor network"),
                vec![
                    format!("Severs {links} dependency relationship(s)"),
                    format!("Services provided by {id} need a fallback provider"),
                ],
            )
        }
        Action::RemoveEdge { source, target } => (
            format!("Remove the dependency {}", edge_label(source, target)),
            vec![format!(
                "{target} loses the integration it receives from {source}"
            )],
        ),
    }
}

/// Generic hardening recommendations that apply regardless of graph shape.
pub fn hardening_catalogue() -> Vec<HardeningTemplate> {
    let template = |category: &str, title: &str, description: &str, reduction: u8, cost| {
        HardeningTemplate {
            category: category.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            risk_reduction: reduction,
            relative_cost: cost,
        }
    };
    vec![
        template(
            "authentication",
            "Multi-Factor Authentication Redundancy",
            "Deploy a secondary authentication provider as a failover system.",
            45,
            Complexity::Medium,
        ),
        template(
            "monitoring",
            "Real-time Threat Monitoring",
            "Monitor vendor integrations continuously and alert on anomalies.",
            35,
            Complexity::Low,
        ),
        template(
            "isolation",
            "Network Segmentation",
            "Micro-segment critical vendors from the rest of the network.",
            40,
            Complexity::Low,
        ),
        template(
            "monitoring",
            "Vendor Risk Assessment Automation",
            "Reassess every vendor continuously instead of at audit time.",
            25,
            Complexity::Low,
        ),
        template(
            "hardening",
            "Incident Response Plan",
            "Maintain response procedures for supply-chain compromise.",
            30,
            Complexity::Low,
        ),
        template(
            "monitoring",
            "Supply Chain Visibility Platform",
            "Track vendor dependencies and their status in one place.",
            20,
            Complexity::Medium,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::types::{Edge, EdgeType, Node, Tier};

    /// A→B, A→C, B→D, C→D.
    fn diamond() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for id in ["a", "b", "c", "d"] {
            g.add_node(Node::new(id, Tier::STANDARD)).unwrap();
        }
        for (s, t) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")] {
            g.add_edge(Edge::new(s, t, EdgeType::DependsOn).with_strength(0.7))
                .unwrap();
        }
        g
    }

    fn config(parallel: bool) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.simulation.path_depth = 2;
        config.mitigation.parallel = parallel;
        config
    }

    fn baseline(g: &DependencyGraph, config: &EngineConfig) -> SimulationResult {
        run_simulation(g, &["a"], 11, &config.simulation, None).unwrap()
    }

    #[test]
    fn test_isolating_b_reduces_paths() {
        let g = diamond();
        let config = config(false);
        let sim = baseline(&g, &config);
        let report = generate_mitigations(&g, &sim, None, &config).unwrap();

        // Depth max(2 + 1, 3) = 3; a→b, a→c, a→b→d, a→c→d.
        assert_eq!(report.evaluation_depth, 3);
        assert_eq!(report.original_path_count, 4);

        let b = report
            .evaluated
            .iter()
            .find(|c| c.action == ActionType::IsolateNode && c.target == "b")
            .unwrap();
        assert!(b.feasible);
        assert_eq!(b.paths_reduced, 2);
        assert!((b.risk_reduction - 0.5).abs() < 1e-12);
        assert_eq!(b.implementation_complexity, Complexity::Low);
        assert!(b.compromised_after.is_some());
    }

    /// hub → m0..m5, each mid → six leaves: 42 paths within three hops.
    fn fan_out() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_node(Node::new("hub", Tier::CRITICAL)).unwrap();
        for m in 0..6 {
            let mid = format!("m{m}");
            g.add_node(Node::new(mid.as_str(), Tier::IMPORTANT)).unwrap();
            g.add_edge(Edge::new("hub", mid.as_str(), EdgeType::DependsOn).with_strength(0.5))
                .unwrap();
            for l in 0..6 {
                let leaf = format!("l{m}{l}");
                g.add_node(Node::new(leaf.as_str(), Tier::STANDARD)).unwrap();
                g.add_edge(Edge::new(mid.as_str(), leaf, EdgeType::DependsOn).with_strength(0.5))
                    .unwrap();
            }
        }
        g
    }

    #[test]
    fn test_reductions_survive_capped_baseline_paths() {
        let g = fan_out();
        let mut config = config(false);
        config.simulation.max_paths = 20;
        let sim = run_simulation(&g, &["hub"], 3, &config.simulation, None).unwrap();
        assert!(sim.paths_truncated);

        let report = generate_mitigations(&g, &sim, None, &config).unwrap();
        assert_eq!(report.original_path_count, 42);
        assert!(!report.paths_truncated);

        let cut = report
            .evaluated
            .iter()
            .find(|c| c.action == ActionType::RemoveEdge && c.target == "hub→m0")
            .unwrap();
        assert_eq!(cut.paths_reduced, 7);
        assert!(!report.ranked.is_empty());
    }

    #[test]
    fn test_count_budget_is_reported() {
        let g = fan_out();
        let mut config = config(false);
        config.mitigation.max_counted_paths = 20;
        let sim = run_simulation(&g, &["hub"], 3, &config.simulation, None).unwrap();

        let report = generate_mitigations(&g, &sim, None, &config).unwrap();
        assert!(report.paths_truncated);
        assert_eq!(report.original_path_count, 20);
    }

    #[test]
    fn test_candidates_exclude_initial_nodes() {
        let g = diamond();
        let config = config(false);
        let sim = baseline(&g, &config);
        let report = generate_mitigations(&g, &sim, None, &config).unwrap();
        assert!(!report
            .evaluated
            .iter()
            .any(|c| c.action == ActionType::IsolateNode && c.target == "a"));
        // d appears on two paths, b and c on two each.
        let d = report.evaluated.iter().find(|c| c.target == "d").unwrap();
        assert_eq!(d.path_frequency, 2);
    }

    #[test]
    fn test_ranking_order() {
        let g = diamond();
        let config = config(false);
        let sim = baseline(&g, &config);
        let report = generate_mitigations(&g, &sim, None, &config).unwrap();

        assert!(!report.ranked.is_empty());
        for pair in report.ranked.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.risk_reduction >= b.risk_reduction);
            if a.risk_reduction == b.risk_reduction && a.paths_reduced == b.paths_reduced {
                assert!(
                    a.implementation_complexity < b.implementation_complexity
                        || (a.implementation_complexity == b.implementation_complexity
                            && a.target <= b.target)
                );
            }
        }
        for c in &report.evaluated {
            assert!((0.0..=1.0).contains(&c.risk_reduction));
        }
        let sum: usize = report.evaluated.iter().map(|c| c.paths_reduced).sum();
        assert_eq!(report.total_paths_reducible_upper_bound, sum);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let g = diamond();
        let sequential = {
            let config = config(false);
            let sim = baseline(&g, &config);
            generate_mitigations(&g, &sim, None, &config).unwrap()
        };
        let parallel = {
            let config = config(true);
            let sim = baseline(&g, &config);
            generate_mitigations(&g, &sim, None, &config).unwrap()
        };
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_candidate_cap() {
        let g = diamond();
        let mut config = config(false);
        config.mitigation.max_candidates = 2;
        let sim = baseline(&g, &config);
        let report = generate_mitigations(&g, &sim, None, &config).unwrap();
        assert_eq!(report.evaluated.len(), 2);
    }

    #[test]
    fn test_other_graph_rejected() {
        let g = diamond();
        let config = config(false);
        let sim = baseline(&g, &config);
        let mut other = g.clone();
        other.add_node(Node::new("e", Tier::STANDARD)).unwrap();
        let err = generate_mitigations(&other, &sim, None, &config).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[test]
    fn test_initial_node_is_infeasible() {
        let g = diamond();
        let config = config(false);
        let sim = baseline(&g, &config);
        let candidate = Candidate {
            action: Action::Isolate("a".into()),
            frequency: 0,
        };
        let result = evaluate_candidate(&g, &sim, &candidate, 4, 3, None, &config);
        assert!(!result.feasible);
        assert_eq!(result.risk_reduction, 0.0);

        let missing = Candidate {
            action: Action::RemoveEdge {
                source: "d".into(),
                target: "a".into(),
            },
            frequency: 0,
        };
        assert!(!evaluate_candidate(&g, &sim, &missing, 4, 3, None, &config).feasible);
    }

    #[test]
    fn test_no_paths_means_no_reduction() {
        let mut g = DependencyGraph::new();
        g.add_node(Node::new("solo", Tier::STANDARD)).unwrap();
        let config = config(false);
        let sim = run_simulation(&g, &["solo"], 1, &config.simulation, None).unwrap();
        let report = generate_mitigations(&g, &sim, None, &config).unwrap();
        assert_eq!(report.original_path_count, 0);
        assert!(report.evaluated.is_empty());
        assert!(report.ranked.is_empty());
        assert_eq!(report.hardening.len(), 6);
    }
}
