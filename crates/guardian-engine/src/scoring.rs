//! Multi-factor risk scoring.
//!
//! Each node gets four sub-scores in `[0, 1]` (base, structural, cascade
//! amplification, centrality) which are blended with the configured weights
//! and scaled by its tier multiplier. Network aggregates summarise the
//! per-node profiles. Nothing is cached; every call recomputes from the
//! graph.

use std::collections::{BTreeMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use guardian_core::config::{EngineConfig, RiskConfig};
use guardian_core::types::{ContractTerm, Node, RiskFactor, RiskLevel, Tier};
use guardian_graph::{DependencyGraph, Topology};

use crate::error::{EngineError, Result};
use crate::paths::PathScorer;
use crate::predictor::{self, reachability_amplification, Predictor};
use crate::stats::{clamp01, mean, std_dev};
use crate::structural::{analyze_topology, CancelToken};
use crate::types::{
    HardeningImpact, NodeCentrality, NodeRiskProfile, ResilienceBreakdown, RiskAssessment,
    RiskHotspot, RiskMetrics, ScoredPath, StructuralAnalysis,
};

/// Stored risk of a hardened node is scaled by this factor.
pub const HARDENING_RISK_FACTOR: f64 = 0.3;

/// Default hop radius when grouping high-risk nodes into hotspots.
pub const DEFAULT_HOTSPOT_RADIUS: usize = 2;

/// Connectivity is edge density scaled by this factor, capped at 1.
const CONNECTIVITY_SCALE: f64 = 10.0;

/// Score every node and aggregate, with audit staleness judged against now.
pub fn calculate_comprehensive_risk(
    graph: &DependencyGraph,
    predictor: Option<&dyn Predictor>,
    config: &EngineConfig,
) -> Result<RiskAssessment> {
    calculate_comprehensive_risk_at(graph, predictor, config, Utc::now())
}

/// Like [`calculate_comprehensive_risk`] with an explicit reference time.
pub fn calculate_comprehensive_risk_at(
    graph: &DependencyGraph,
    predictor: Option<&dyn Predictor>,
    config: &EngineConfig,
    as_of: DateTime<Utc>,
) -> Result<RiskAssessment> {
    config.validate()?;
    let risk_config = &config.risk;

    if graph.is_empty() {
        return Ok(empty_assessment());
    }

    let topo = graph.topology();
    let cancel = CancelToken::from_config(&config.structural);
    let structure = analyze_topology(&topo, &config.structural, &cancel);

    let node_risk = predictor::query(predictor, "node_risk", |p| p.predict_node_risk(graph));
    let amplification = predictor::query(predictor, "cascade_amplification", |p| {
        p.predict_cascade_amplification(graph)
    });

    let spof: HashSet<&str> = structure
        .single_points_of_failure
        .iter()
        .map(String::as_str)
        .collect();
    let bridges: HashSet<&str> = structure.bridge_nodes.iter().map(String::as_str).collect();

    let mut profiles: BTreeMap<String, NodeRiskProfile> = BTreeMap::new();
    for (i, node) in graph.nodes().enumerate() {
        let start = node_risk
            .values
            .as_ref()
            .and_then(|m| m.get(&node.id).copied())
            .unwrap_or(node.risk_score);
        let base = base_risk(node, start, risk_config, as_of);

        let structural = structural_risk(
            &topo,
            i,
            spof.contains(node.id.as_str()),
            bridges.contains(node.id.as_str()),
        );

        let cascade = match amplification
            .values
            .as_ref()
            .and_then(|m| m.get(&node.id).copied())
        {
            Some(a) => a,
            None => {
                let reach = graph.descendants(&node.id)?.len();
                reachability_amplification(graph, reach, node.tier.value())
            }
        };

        let centrality = structure
            .centrality
            .get(&node.id)
            .map_or(0.0, centrality_risk);

        profiles.insert(
            node.id.clone(),
            profile(node, base, structural, cascade, centrality, risk_config),
        );
    }

    let critical_paths = critical_paths(graph, &topo, &profiles, risk_config);
    let metrics = aggregate(
        graph,
        &topo,
        &profiles,
        &structure,
        critical_paths.len(),
        risk_config,
        node_risk.degraded || amplification.degraded,
    );

    tracing::info!(
        nodes = profiles.len(),
        overall = metrics.overall_score,
        resilience = metrics.resilience_score,
        critical_paths = metrics.critical_path_count,
        "risk assessment complete"
    );

    Ok(RiskAssessment {
        metrics,
        profiles,
        critical_paths,
    })
}

fn empty_assessment() -> RiskAssessment {
    RiskAssessment {
        metrics: RiskMetrics {
            overall_score: 0.0,
            tier_1_exposure: 0.0,
            cascade_potential: 0.0,
            single_point_failures: 0,
            critical_path_count: 0,
            vulnerability_density: 0.0,
            resilience_score: 1.0,
            resilience: ResilienceBreakdown {
                redundancy: 1.0,
                evenness: 1.0,
                connectivity: 1.0,
                tier_diversity: 1.0,
            },
            degraded_metrics: Vec::new(),
            predictor_degraded: false,
        },
        profiles: BTreeMap::new(),
        critical_paths: Vec::new(),
    }
}

// ── Sub-scores ───────────────────────────────────────────────────

/// Stored (or predicted) risk adjusted for audit age, certifications and
/// contract horizon. Clamped after every step.
pub fn base_risk(node: &Node, start: f64, config: &RiskConfig, as_of: DateTime<Utc>) -> f64 {
    let profile = &node.profile;
    let mut risk = clamp01(start);

    let stale = match profile.last_audit {
        Some(at) => (as_of - at).num_days() > config.audit_max_age_days,
        None => true,
    };
    if stale {
        risk = clamp01(risk + 0.1);
    }

    match profile.certifications.len() {
        0 => risk = clamp01(risk + 0.15),
        1 => {}
        _ => risk = clamp01(risk - 0.1),
    }

    match profile.contract {
        ContractTerm::ShortTerm => risk = clamp01(risk + 0.1),
        ContractTerm::LongTerm => risk = clamp01(risk - 0.05),
        ContractTerm::Unknown => {}
    }

    risk
}

/// Degree share weighted toward dependents, plus penalties for cut
/// positions.
pub fn structural_risk(topo: &Topology, index: usize, is_spof: bool, is_bridge: bool) -> f64 {
    let others = topo.node_count().saturating_sub(1).max(1) as f64;
    let mut risk = 0.6 * topo.in_degree(index) as f64 / others
        + 0.4 * topo.out_degree(index) as f64 / others;
    if is_spof {
        risk += 0.3;
    }
    if is_bridge {
        risk += 0.2;
    }
    clamp01(risk)
}

pub fn centrality_risk(c: &NodeCentrality) -> f64 {
    clamp01(0.3 * c.betweenness + 0.2 * c.closeness + 0.3 * c.pagerank + 0.2 * c.degree)
}

fn profile(
    node: &Node,
    base: f64,
    structural: f64,
    cascade: f64,
    centrality: f64,
    config: &RiskConfig,
) -> NodeRiskProfile {
    let w = &config.weights;
    let weighted = w.base * base
        + w.structural * structural
        + w.cascade * cascade
        + w.centrality * centrality;
    let combined = clamp01(weighted * config.tier_multipliers.for_tier(node.tier));

    let threshold = config.factor_threshold;
    let mut factors = Vec::new();
    if base > threshold {
        factors.push(RiskFactor::HighBaseRisk);
    }
    if structural > threshold {
        factors.push(RiskFactor::CriticalStructuralPosition);
    }
    if cascade > threshold {
        factors.push(RiskFactor::HighCascadeAmplification);
    }
    if centrality > threshold {
        factors.push(RiskFactor::HighCentrality);
    }
    if node.tier == Tier::CRITICAL {
        factors.push(RiskFactor::CriticalTier);
    }
    if factors.is_empty() {
        factors.push(RiskFactor::ModerateAcrossFactors);
    }

    NodeRiskProfile {
        node_id: node.id.clone(),
        tier: node.tier.value(),
        base_risk: base,
        structural_risk: structural,
        cascade_amplification: cascade,
        centrality_risk: centrality,
        combined_risk: combined,
        risk_level: RiskLevel::from_score(combined),
        contributing_factors: factors,
    }
}

fn is_high(level: RiskLevel) -> bool {
    matches!(level, RiskLevel::High | RiskLevel::Critical)
}

// ── Aggregates ───────────────────────────────────────────────────

/// Scored paths above the threshold, starting from high and critical nodes.
fn critical_paths(
    graph: &DependencyGraph,
    topo: &Topology,
    profiles: &BTreeMap<String, NodeRiskProfile>,
    config: &RiskConfig,
) -> Vec<ScoredPath> {
    let scorer = PathScorer::new(graph, topo);
    let mut paths = Vec::new();
    for (i, id) in topo.ids.iter().enumerate() {
        if !profiles.get(id).is_some_and(|p| is_high(p.risk_level)) {
            continue;
        }
        let scored = scorer.paths_from(
            i,
            config.critical_path_depth,
            config.paths_per_source,
            config.critical_path_budget,
        );
        if scored.truncated {
            tracing::debug!(
                source = %id,
                budget = config.critical_path_budget,
                "Critical-path search hit its expansion budget"
            );
        }
        paths.extend(
            scored
                .paths
                .into_iter()
                .filter(|p| p.risk > config.critical_path_threshold),
        );
    }
    paths.sort_by(|a, b| b.risk.total_cmp(&a.risk));
    paths
}

fn aggregate(
    graph: &DependencyGraph,
    topo: &Topology,
    profiles: &BTreeMap<String, NodeRiskProfile>,
    structure: &StructuralAnalysis,
    critical_path_count: usize,
    config: &RiskConfig,
    predictor_degraded: bool,
) -> RiskMetrics {
    let nodes: Vec<(&Node, &NodeRiskProfile)> = graph
        .nodes()
        .filter_map(|n| profiles.get(&n.id).map(|p| (n, p)))
        .collect();

    let (weighted, weight_sum) = nodes.iter().fold((0.0, 0.0), |(acc, sum), (n, p)| {
        let m = config.tier_multipliers.for_tier(n.tier);
        (acc + m * p.combined_risk, sum + m)
    });
    let overall_score = if weight_sum > 0.0 {
        clamp01(weighted / weight_sum)
    } else {
        0.0
    };

    let tier_1: Vec<f64> = nodes
        .iter()
        .filter(|(n, _)| n.tier == Tier::CRITICAL)
        .map(|(_, p)| p.combined_risk)
        .collect();

    let cascade: Vec<f64> = nodes
        .iter()
        .map(|(_, p)| p.cascade_amplification * p.combined_risk)
        .collect();

    let high = nodes.iter().filter(|(_, p)| is_high(p.risk_level)).count();

    let combined: Vec<f64> = nodes.iter().map(|(_, p)| p.combined_risk).collect();
    let resilience = resilience(graph, topo, &combined);
    let resilience_score = clamp01(
        (resilience.redundancy
            + resilience.evenness
            + resilience.connectivity
            + resilience.tier_diversity)
            / 4.0,
    );

    RiskMetrics {
        overall_score,
        tier_1_exposure: clamp01(mean(&tier_1)),
        cascade_potential: clamp01(mean(&cascade)),
        single_point_failures: structure.single_points_of_failure.len(),
        critical_path_count,
        vulnerability_density: high as f64 / nodes.len().max(1) as f64,
        resilience_score,
        resilience,
        degraded_metrics: structure.degraded_metrics.clone(),
        predictor_degraded,
    }
}

fn resilience(graph: &DependencyGraph, topo: &Topology, combined: &[f64]) -> ResilienceBreakdown {
    let n = topo.node_count();
    let edges = topo.edge_count() as f64;

    let (redundancy, connectivity) = if n <= 1 {
        (1.0, 1.0)
    } else {
        let spanning = (n - 1) as f64;
        let possible = (n * (n - 1)) as f64;
        (
            clamp01((edges - spanning) / spanning),
            (edges / possible * CONNECTIVITY_SCALE).min(1.0),
        )
    };

    let m = mean(combined);
    let evenness = if m > 0.0 {
        1.0 / (1.0 + std_dev(combined) / m)
    } else {
        1.0
    };

    let stats = graph.statistics();
    let total: usize = stats.tier_distribution.values().sum();
    let entropy: f64 = stats
        .tier_distribution
        .values()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum();
    let tier_diversity = clamp01(entropy / (Tier::all().len() as f64).log2());

    ResilienceBreakdown {
        redundancy,
        evenness: clamp01(evenness),
        connectivity,
        tier_diversity,
    }
}

// ── Derived views ────────────────────────────────────────────────

/// Node ids grouped by risk level. Every level is present, possibly empty.
pub fn risk_level_distribution(assessment: &RiskAssessment) -> BTreeMap<RiskLevel, Vec<String>> {
    let mut levels: BTreeMap<RiskLevel, Vec<String>> = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ]
    .into_iter()
    .map(|l| (l, Vec::new()))
    .collect();
    for profile in assessment.profiles.values() {
        levels
            .entry(profile.risk_level)
            .or_default()
            .push(profile.node_id.clone());
    }
    levels
}

/// Clusters of high and critical nodes connected to each other within
/// `radius` undirected hops. A node joins at most one cluster; clusters of a
/// single node are dropped. Sorted by average combined risk, highest first.
pub fn identify_hotspots(
    graph: &DependencyGraph,
    assessment: &RiskAssessment,
    radius: usize,
) -> Result<Vec<RiskHotspot>> {
    let high: HashSet<&str> = assessment
        .profiles
        .values()
        .filter(|p| is_high(p.risk_level))
        .map(|p| p.node_id.as_str())
        .collect();
    let risk_of = |id: &str| assessment.profiles.get(id).map_or(0.0, |p| p.combined_risk);

    let mut processed: HashSet<&str> = HashSet::new();
    let mut hotspots = Vec::new();

    for center in graph.nodes().map(|n| n.id.as_str()) {
        if !high.contains(center) || processed.contains(center) {
            continue;
        }

        let mut cluster: Vec<&str> = vec![center];
        let mut visited: HashSet<&str> = HashSet::from([center]);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(center, 0)]);
        while let Some((current, distance)) = queue.pop_front() {
            if distance >= radius {
                continue;
            }
            for next in graph.neighbors(current)? {
                if high.contains(next) && !processed.contains(next) && visited.insert(next) {
                    cluster.push(next);
                    queue.push_back((next, distance + 1));
                }
            }
        }

        if cluster.len() >= 2 {
            let average_risk =
                cluster.iter().map(|id| risk_of(id)).sum::<f64>() / cluster.len() as f64;
            processed.extend(cluster.iter().copied());
            hotspots.push(RiskHotspot {
                center: center.to_string(),
                nodes: cluster.into_iter().map(String::from).collect(),
                average_risk,
            });
        }
    }

    hotspots.sort_by(|a, b| b.average_risk.total_cmp(&a.average_risk));
    Ok(hotspots)
}

/// Aggregate change from hardening `targets`: their stored risk is scaled
/// by [`HARDENING_RISK_FACTOR`] on a clone and the assessment recomputed.
pub fn hardening_impact<S: AsRef<str>>(
    graph: &DependencyGraph,
    predictor: Option<&dyn Predictor>,
    config: &EngineConfig,
    targets: &[S],
) -> Result<HardeningImpact> {
    let as_of = Utc::now();
    let mut hardened = graph.clone();
    for target in targets {
        let id = target.as_ref();
        let mut node = graph
            .node(id)
            .cloned()
            .ok_or_else(|| EngineError::NodeNotFound {
                node_id: id.to_string(),
            })?;
        node.risk_score *= HARDENING_RISK_FACTOR;
        hardened.add_node(node)?;
    }

    let before = calculate_comprehensive_risk_at(graph, predictor, config, as_of)?.metrics;
    let after = calculate_comprehensive_risk_at(&hardened, predictor, config, as_of)?.metrics;

    Ok(HardeningImpact {
        overall_risk_reduction: before.overall_score - after.overall_score,
        cascade_reduction: before.cascade_potential - after.cascade_potential,
        vulnerability_reduction: before.vulnerability_density - after.vulnerability_density,
        resilience_improvement: after.resilience_score - before.resilience_score,
    })
}
