//! Property tests for simulation, scoring and mitigation invariants over
//! small random graphs.

use std::collections::HashSet;

use guardian_core::types::{Edge, EdgeType, Node, RiskLevel, Tier};
use guardian_core::EngineConfig;
use guardian_engine::cascade::run_simulation;
use guardian_engine::mitigation::generate_mitigations;
use guardian_engine::paths::{count_paths, enumerate_paths};
use guardian_engine::scoring::calculate_comprehensive_risk;
use guardian_graph::DependencyGraph;
use proptest::prelude::*;

const MAX_NODES: usize = 8;

#[derive(Debug, Clone)]
struct GraphSpec {
    nodes: Vec<(u8, f64, f64)>,
    edges: Vec<(usize, usize, f64, u8)>,
}

fn arb_graph() -> impl Strategy<Value = GraphSpec> {
    (1..=MAX_NODES).prop_flat_map(|n| {
        let nodes = prop::collection::vec((1u8..=3, 0.0..=1.0f64, 0.0..=100.0f64), n);
        let edges = prop::collection::vec((0..n, 0..n, 0.0..=1.0f64, 0u8..3), 0..(n * 3));
        (nodes, edges).prop_map(|(nodes, edges)| GraphSpec { nodes, edges })
    })
}

fn build(spec: &GraphSpec) -> DependencyGraph {
    let mut g = DependencyGraph::new();
    for (i, &(tier, risk, criticality)) in spec.nodes.iter().enumerate() {
        let node = Node::new(format!("v{i}"), Tier::new(tier).unwrap())
            .with_risk_score(risk)
            .with_criticality(criticality);
        g.add_node(node).unwrap();
    }
    for &(s, t, strength, kind) in &spec.edges {
        let edge_type = match kind {
            0 => EdgeType::DependsOn,
            1 => EdgeType::IntegratesWith,
            _ => EdgeType::Supplies,
        };
        g.add_edge(Edge::new(format!("v{s}"), format!("v{t}"), edge_type).with_strength(strength))
            .unwrap();
    }
    g
}

fn initial_set(spec: &GraphSpec, picks: &[usize]) -> Vec<String> {
    picks
        .iter()
        .map(|p| format!("v{}", p % spec.nodes.len()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn compromise_only_grows(
        spec in arb_graph(),
        picks in prop::collection::vec(0usize..MAX_NODES, 0..3),
        seed in any::<u64>(),
    ) {
        let g = build(&spec);
        let initial = initial_set(&spec, &picks);
        let config = EngineConfig::default();
        let result = run_simulation(&g, initial.as_slice(), seed, &config.simulation, None).unwrap();

        let final_set: HashSet<&str> = result.final_compromised.iter().map(String::as_str).collect();
        for id in &initial {
            prop_assert!(final_set.contains(id.as_str()));
        }

        let mut seen: HashSet<&str> = result.initial_compromised.iter().map(String::as_str).collect();
        let mut size = seen.len();
        for wave in &result.waves {
            prop_assert!(!wave.newly_compromised.is_empty());
            for id in &wave.newly_compromised {
                prop_assert!(seen.insert(id.as_str()), "{id} compromised twice");
            }
            prop_assert!(seen.len() > size);
            size = seen.len();
        }
        prop_assert_eq!(size, result.final_compromised.len());
        prop_assert!(result.affected.len() >= result.final_compromised.len());
    }

    #[test]
    fn same_seed_is_byte_identical(
        spec in arb_graph(),
        picks in prop::collection::vec(0usize..MAX_NODES, 1..3),
        seed in any::<u64>(),
    ) {
        let g = build(&spec);
        let initial = initial_set(&spec, &picks);
        let config = EngineConfig::default();
        let a = run_simulation(&g, initial.as_slice(), seed, &config.simulation, None).unwrap();
        let b = run_simulation(&g, initial.as_slice(), seed, &config.simulation, None).unwrap();
        prop_assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }

    #[test]
    fn risk_scores_are_bounded(spec in arb_graph()) {
        let g = build(&spec);
        let assessment = calculate_comprehensive_risk(&g, None, &EngineConfig::default()).unwrap();
        for profile in assessment.profiles.values() {
            prop_assert!((0.0..=1.0).contains(&profile.combined_risk));
            prop_assert_eq!(profile.risk_level, RiskLevel::from_score(profile.combined_risk));
        }
        let m = &assessment.metrics;
        prop_assert!((0.0..=1.0).contains(&m.resilience_score));
        prop_assert!((0.0..=1.0).contains(&m.vulnerability_density));
        prop_assert!((0.0..=1.0).contains(&m.overall_score));
    }

    #[test]
    fn risk_levels_partition_unit_interval(score in 0.0..=1.0f64) {
        let level = RiskLevel::from_score(score);
        let expected = if score >= 0.8 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        prop_assert_eq!(level, expected);
    }

    #[test]
    fn mitigation_reductions_are_bounded(
        spec in arb_graph(),
        pick in 0usize..MAX_NODES,
        seed in any::<u64>(),
    ) {
        let g = build(&spec);
        let initial = initial_set(&spec, &[pick]);
        let config = EngineConfig::default();
        let simulation = run_simulation(&g, initial.as_slice(), seed, &config.simulation, None).unwrap();
        let report = generate_mitigations(&g, &simulation, None, &config).unwrap();

        for candidate in &report.evaluated {
            prop_assert!((0.0..=1.0).contains(&candidate.risk_reduction));
            prop_assert!(candidate.paths_reduced <= report.original_path_count);
        }
        for candidate in &report.ranked {
            prop_assert!(candidate.feasible);
            prop_assert!(candidate.risk_reduction > 0.0);
        }
    }

    #[test]
    fn removing_a_node_never_adds_paths(spec in arb_graph(), pick in 0usize..MAX_NODES) {
        let g = build(&spec);
        let source = format!("v{}", pick % spec.nodes.len());
        let topo = g.topology();
        let from = topo.index_of(&source).unwrap();
        let before = enumerate_paths(&topo, &[from], 3, usize::MAX).len();

        for node in g.nodes().filter(|n| n.id != source) {
            let mut modified = g.clone();
            modified.remove_node(&node.id).unwrap();
            let topo = modified.topology();
            let from = topo.index_of(&source).unwrap();
            let after = enumerate_paths(&topo, &[from], 3, usize::MAX).len();
            prop_assert!(after <= before, "removing {} grew paths {} -> {}", node.id, before, after);
        }
    }

    #[test]
    fn removing_an_edge_never_adds_paths(spec in arb_graph(), pick in 0usize..MAX_NODES) {
        let g = build(&spec);
        let source = format!("v{}", pick % spec.nodes.len());
        let topo = g.topology();
        let from = topo.index_of(&source).unwrap();
        let before = count_paths(&topo, &[from], 3, usize::MAX).count;

        let pairs: Vec<(String, String)> = g
            .edges()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        for (s, t) in &pairs {
            let mut modified = g.clone();
            modified.remove_edge(s, t).unwrap();
            let topo = modified.topology();
            let from = topo.index_of(&source).unwrap();
            let after = count_paths(&topo, &[from], 3, usize::MAX).count;
            prop_assert!(after <= before, "removing {}->{} grew paths {} -> {}", s, t, before, after);
        }
    }
}
