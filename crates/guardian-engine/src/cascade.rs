//! Stochastic cascade simulation.
//!
//! Compromise spreads in discrete waves. In each wave every outgoing edge
//! from a compromised node to a secure node gets exactly one uniform draw
//! from the caller's RNG, in ascending source index and then edge insertion
//! order, so a seed fully determines the run. Nodes reached in a wave turn
//! compromised only when the wave ends; a compromised node is never a
//! target again, which keeps cyclic graphs finite.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use guardian_core::config::SimulationConfig;
use guardian_core::types::{Edge, EdgeType, Node, NodeStatus, Tier};
use guardian_graph::DependencyGraph;

use crate::error::{EngineError, Result};
use crate::paths::enumerate_paths;
use crate::predictor::{self, Predictor};
use crate::stats::percentile;
use crate::types::{
    BottleneckNode, PropagationEdge, PropagationWave, SimulationMetrics, SimulationResult,
    Termination,
};

/// Namespace for deterministic simulation ids.
const GUARDIAN_NS: Uuid = Uuid::from_bytes([
    0x3d, 0x1f, 0x8a, 0x52, 0x47, 0xc9, 0x4e, 0x0b, 0x9a, 0x61, 0x2e, 0x7f, 0xd0, 0x55, 0xb8, 0x14,
]);

const BOTTLENECK_LIMIT: usize = 10;

/// Probability and delay of compromise crossing one edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transmission {
    pub probability: f64,
    pub delay: f64,
}

/// Apply the base formula and the configured modifiers to one edge.
///
/// Base probability is `strength × (1 − criticality/100)` of the target.
pub fn transmission(
    source: &Node,
    target: &Node,
    edge: &Edge,
    target_in_degree: usize,
    in_degree_threshold: Option<f64>,
    config: &SimulationConfig,
) -> Transmission {
    let rules = &config.rules;
    let mut p = edge.strength * (1.0 - target.criticality_score / 100.0);
    let mut delay = config.base_delay;

    let mut apply = |enabled: bool, rule: &guardian_core::config::PropagationRule| {
        if enabled && rule.enabled {
            p *= rule.probability_factor;
            delay *= rule.delay_factor;
        }
    };

    apply(source.tier == Tier::CRITICAL, &rules.tier_amplification);
    apply(
        edge.category.eq_ignore_ascii_case("authentication"),
        &rules.authentication,
    );
    apply(is_api_edge(edge), &rules.api_integration);
    apply(
        edge.strength > rules.strong_dependency_threshold,
        &rules.strong_dependency,
    );
    apply(
        in_degree_threshold.is_some_and(|t| target_in_degree as f64 >= t),
        &rules.high_in_degree,
    );

    Transmission {
        probability: p.clamp(0.0, 1.0),
        delay: delay.max(config.min_delay),
    }
}

fn is_api_edge(edge: &Edge) -> bool {
    edge.edge_type == EdgeType::IntegratesWith
        || ["api_call", "api", "integration"]
            .iter()
            .any(|c| edge.category.eq_ignore_ascii_case(c))
}

/// Run a simulation with a `StdRng` seeded from `seed`.
pub fn run_simulation<S: AsRef<str>>(
    graph: &DependencyGraph,
    initial_compromised: &[S],
    seed: u64,
    config: &SimulationConfig,
    predictor: Option<&dyn Predictor>,
) -> Result<SimulationResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    run_simulation_with_rng(graph, initial_compromised, seed, &mut rng, config, predictor)
}

/// Run a simulation drawing from a caller-supplied RNG. `seed` is only
/// recorded in the result and its id.
pub fn run_simulation_with_rng<S: AsRef<str>, R: Rng + ?Sized>(
    graph: &DependencyGraph,
    initial_compromised: &[S],
    seed: u64,
    rng: &mut R,
    config: &SimulationConfig,
    predictor: Option<&dyn Predictor>,
) -> Result<SimulationResult> {
    config.validate()?;
    let topo = graph.topology();
    let nodes: Vec<&Node> = graph.nodes().collect();
    let n = nodes.len();

    // Deduplicate while keeping caller order.
    let mut initial: Vec<usize> = Vec::new();
    for id in initial_compromised {
        let id = id.as_ref();
        let idx = topo.index_of(id).ok_or_else(|| EngineError::NodeNotFound {
            node_id: id.to_string(),
        })?;
        if !initial.contains(&idx) {
            initial.push(idx);
        }
    }

    // Outgoing edges per dense index, insertion order, self-loops dropped.
    let mut out_edges: Vec<Vec<(usize, &Edge)>> = vec![Vec::new(); n];
    for edge in graph.edges() {
        if let (Some(s), Some(t)) = (topo.index_of(&edge.source), topo.index_of(&edge.target)) {
            if s != t {
                out_edges[s].push((t, edge));
            }
        }
    }

    let in_degrees: Vec<f64> = (0..n).map(|i| topo.in_degree(i) as f64).collect();
    let in_degree_threshold = percentile(&in_degrees, config.rules.high_in_degree_percentile);

    let amplification = predictor::query(predictor, "cascade_amplification", |p| {
        p.predict_cascade_amplification(graph)
    });

    // Transmission parameters depend only on the graph, so compute them once.
    let params: Vec<Vec<Transmission>> = out_edges
        .iter()
        .enumerate()
        .map(|(s, edges)| {
            let boost = amplification
                .values
                .as_ref()
                .and_then(|m| m.get(&nodes[s].id).copied());
            edges
                .iter()
                .map(|&(t, edge)| {
                    let mut tx = transmission(
                        nodes[s],
                        nodes[t],
                        edge,
                        topo.in_degree(t),
                        in_degree_threshold,
                        config,
                    );
                    if let Some(a) = boost {
                        tx.probability = (tx.probability * (1.0 + a)).clamp(0.0, 1.0);
                    }
                    tx
                })
                .collect()
        })
        .collect();

    let mut compromised = vec![false; n];
    let mut arrival = vec![0.0_f64; n];
    let mut order: Vec<usize> = initial.clone();
    for &i in &initial {
        compromised[i] = true;
    }

    let mut waves: Vec<PropagationWave> = Vec::new();
    let mut clock = 0.0_f64;
    let mut termination = Termination::Natural;

    let can_spread = |compromised: &[bool]| {
        (0..n).filter(|&s| compromised[s]).any(|s| {
            out_edges[s]
                .iter()
                .zip(&params[s])
                .any(|(&(t, _), tx)| !compromised[t] && tx.probability > 0.0)
        })
    };

    loop {
        if waves.len() >= config.max_waves {
            if can_spread(&compromised) {
                termination = Termination::WaveBudget;
            }
            break;
        }
        if clock >= config.max_elapsed {
            if can_spread(&compromised) {
                termination = Termination::TimeBudget;
            }
            break;
        }

        let mut reached: BTreeMap<usize, f64> = BTreeMap::new();
        let mut used: Vec<PropagationEdge> = Vec::new();

        for s in 0..n {
            if !compromised[s] {
                continue;
            }
            for (&(t, edge), tx) in out_edges[s].iter().zip(&params[s]) {
                if compromised[t] {
                    continue;
                }
                let roll: f64 = rng.gen();
                if roll < tx.probability {
                    let at = arrival[s] + tx.delay;
                    reached
                        .entry(t)
                        .and_modify(|best| *best = best.min(at))
                        .or_insert(at);
                    used.push(PropagationEdge {
                        source: nodes[s].id.clone(),
                        target: nodes[t].id.clone(),
                        edge_type: edge.edge_type,
                        category: edge.category.clone(),
                        probability: tx.probability,
                        delay: tx.delay,
                        arrival: at,
                    });
                }
            }
        }

        if reached.is_empty() {
            break;
        }

        let mut newly = Vec::with_capacity(reached.len());
        for (&t, &at) in &reached {
            compromised[t] = true;
            arrival[t] = at;
            clock = clock.max(at);
            order.push(t);
            newly.push(nodes[t].id.clone());
        }

        tracing::debug!(
            wave = waves.len() + 1,
            new = newly.len(),
            clock,
            "propagation wave"
        );

        waves.push(PropagationWave {
            index: waves.len() + 1,
            newly_compromised: newly,
            timestamp: clock,
            edges: used,
        });
    }

    let budget_exceeded = termination != Termination::Natural;
    if budget_exceeded {
        tracing::warn!(
            ?termination,
            waves = waves.len(),
            clock,
            "simulation stopped by budget while propagation was still possible"
        );
    }

    // Affected = compromised plus their secure direct successors.
    let mut affected_flags = compromised.clone();
    for s in (0..n).filter(|&s| compromised[s]) {
        for &t in &topo.out[s] {
            affected_flags[t] = true;
        }
    }

    let final_status: BTreeMap<String, NodeStatus> = (0..n)
        .map(|i| {
            let status = if compromised[i] {
                NodeStatus::Compromised
            } else if affected_flags[i] {
                NodeStatus::Affected
            } else {
                NodeStatus::Secure
            };
            (nodes[i].id.clone(), status)
        })
        .collect();

    let structural = enumerate_paths(&topo, &initial, config.path_depth, config.max_paths);

    let initial_ids: Vec<String> = initial.iter().map(|&i| nodes[i].id.clone()).collect();
    let final_compromised: Vec<String> = order.iter().map(|&i| nodes[i].id.clone()).collect();
    let affected: Vec<String> = (0..n)
        .filter(|&i| affected_flags[i])
        .map(|i| nodes[i].id.clone())
        .collect();

    let metrics = compute_metrics(
        graph,
        &nodes,
        &initial_ids,
        &final_compromised,
        &affected,
        &waves,
        clock,
    );

    let fingerprint = graph.fingerprint()?;
    let simulation_id = Uuid::new_v5(
        &GUARDIAN_NS,
        format!("{fingerprint}:{seed}:{}", initial_ids.join(",")).as_bytes(),
    );

    tracing::info!(
        %simulation_id,
        seed,
        initial = initial_ids.len(),
        compromised = final_compromised.len(),
        waves = waves.len(),
        "cascade simulation complete"
    );

    Ok(SimulationResult {
        simulation_id,
        seed,
        graph_fingerprint: fingerprint,
        initial_compromised: initial_ids,
        final_compromised,
        affected,
        waves,
        final_status,
        metrics,
        termination,
        budget_exceeded,
        degraded: amplification.degraded,
        propagation_paths: structural.to_ids(&topo),
        max_path_length: structural.max_length(),
        paths_truncated: structural.truncated,
    })
}

fn compute_metrics(
    graph: &DependencyGraph,
    nodes: &[&Node],
    initial: &[String],
    compromised: &[String],
    affected: &[String],
    waves: &[PropagationWave],
    clock: f64,
) -> SimulationMetrics {
    let total = nodes.len();
    let rate = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };

    let mut tier_impact = BTreeMap::new();
    let mut category_impact = BTreeMap::new();
    for id in compromised {
        if let Some(node) = graph.node(id) {
            *tier_impact.entry(node.tier.value()).or_insert(0) += 1;
            let category = if node.category.is_empty() {
                "unknown".to_string()
            } else {
                node.category.clone()
            };
            *category_impact.entry(category).or_insert(0) += 1;
        }
    }

    let edges: Vec<&PropagationEdge> = waves.iter().flat_map(|w| &w.edges).collect();

    let is_critical_tier = |id: &str| graph.node(id).is_some_and(|n| n.tier.value() <= 2);
    let critical_path_count = edges
        .iter()
        .filter(|e| is_critical_tier(&e.source) || is_critical_tier(&e.target))
        .count();

    // Reach of each initial node over the edges that actually fired.
    let mut fired: HashMap<&str, Vec<&str>> = HashMap::new();
    for e in &edges {
        fired.entry(e.source.as_str()).or_default().push(e.target.as_str());
    }
    let initial_node_impact: BTreeMap<String, usize> = initial
        .iter()
        .map(|start| {
            let mut seen: HashSet<&str> = HashSet::from([start.as_str()]);
            let mut queue = VecDeque::from([start.as_str()]);
            while let Some(current) = queue.pop_front() {
                for &next in fired.get(current).map(Vec::as_slice).unwrap_or_default() {
                    if seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
            (start.clone(), seen.len() - 1)
        })
        .collect();

    let mut appearances: BTreeMap<&str, usize> = BTreeMap::new();
    for e in &edges {
        *appearances.entry(e.source.as_str()).or_insert(0) += 1;
        *appearances.entry(e.target.as_str()).or_insert(0) += 1;
    }
    let mut bottleneck_nodes: Vec<BottleneckNode> = appearances
        .into_iter()
        .map(|(id, count)| BottleneckNode {
            node_id: id.to_string(),
            appearances: count,
        })
        .collect();
    // Stable sort keeps id order among equal counts.
    bottleneck_nodes.sort_by(|a, b| b.appearances.cmp(&a.appearances));
    bottleneck_nodes.truncate(BOTTLENECK_LIMIT);

    let propagation_velocity = waves
        .iter()
        .map(|w| w.newly_compromised.len() as f64 / (w.timestamp / 1000.0).max(1.0))
        .collect();

    SimulationMetrics {
        total_nodes: total,
        compromised_count: compromised.len(),
        affected_count: affected.len(),
        compromise_rate: rate(compromised.len()),
        impact_rate: rate(affected.len()),
        blast_radius: compromised.len() - initial.len(),
        cascade_depth: waves.len(),
        elapsed_time: clock,
        average_propagation_time: clock / waves.len().max(1) as f64,
        propagation_efficiency: compromised.len() as f64 / (clock / 1000.0).max(1.0),
        tier_impact,
        category_impact,
        critical_path_count,
        initial_node_impact,
        bottleneck_nodes,
        largest_wave: waves
            .iter()
            .map(|w| w.newly_compromised.len())
            .max()
            .unwrap_or(0),
        propagation_velocity,
    }
}
