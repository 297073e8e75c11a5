//! Structural vulnerability analysis.
//!
//! Centrality measures over the simple directed graph, plus single points of
//! failure and bridges over its undirected projection. Iterative measures
//! that fail to converge, hit a numerical dead end, or run out of time are
//! replaced by degree centrality and reported in `degraded_metrics`; the
//! analysis itself never fails.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use guardian_core::config::StructuralConfig;
use guardian_graph::{DependencyGraph, Topology};

use crate::stats::percentile;
use crate::types::{CentralityMetric, NodeCentrality, StructuralAnalysis};

// ── Cancellation ─────────────────────────────────────────────────

/// Cooperative cancellation for long analyses: an optional deadline plus a
/// shared flag any clone can raise.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::default(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Token honouring `timeout_ms` from the structural config, if set.
    pub fn from_config(config: &StructuralConfig) -> Self {
        match config.timeout_ms {
            Some(ms) => Self::with_timeout(Duration::from_millis(ms)),
            None => Self::new(),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Why an iterative measure was abandoned.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    Cancelled,
    NotConverged { iterations: usize },
    Numerical(&'static str),
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::NotConverged { iterations } => {
                write!(f, "no convergence after {iterations} iterations")
            }
            Self::Numerical(what) => write!(f, "numerical failure: {what}"),
        }
    }
}

type Measure = std::result::Result<Vec<f64>, Fallback>;

// ── Analysis ─────────────────────────────────────────────────────

/// Run the full structural analysis on a graph.
pub fn analyze(
    graph: &DependencyGraph,
    config: &StructuralConfig,
    cancel: &CancelToken,
) -> StructuralAnalysis {
    analyze_topology(&graph.topology(), config, cancel)
}

pub fn analyze_topology(
    topo: &Topology,
    config: &StructuralConfig,
    cancel: &CancelToken,
) -> StructuralAnalysis {
    let degree = degree_centrality(topo);
    let mut degraded = Vec::new();

    let mut resolve = |metric: CentralityMetric, outcome: Measure| match outcome {
        Ok(values) => values,
        Err(reason) => {
            tracing::warn!(?metric, %reason, "centrality replaced by degree centrality");
            degraded.push(metric);
            degree.clone()
        }
    };

    let betweenness = resolve(
        CentralityMetric::Betweenness,
        betweenness_centrality(topo, cancel),
    );
    let closeness = resolve(
        CentralityMetric::Closeness,
        closeness_centrality(topo, cancel),
    );
    let pagerank = resolve(CentralityMetric::PageRank, pagerank(topo, config, cancel));
    let eigenvector = resolve(
        CentralityMetric::Eigenvector,
        eigenvector_centrality(topo, config, cancel),
    );

    let centrality: BTreeMap<String, NodeCentrality> = topo
        .ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            (
                id.clone(),
                NodeCentrality {
                    degree: degree[i],
                    betweenness: betweenness[i],
                    closeness: closeness[i],
                    pagerank: pagerank[i],
                    eigenvector: eigenvector[i],
                },
            )
        })
        .collect();

    let cut = cut_structure(&topo.undirected());
    let names = |flags: &[bool]| -> Vec<String> {
        flags
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f)
            .map(|(i, _)| topo.ids[i].clone())
            .collect()
    };

    let degrees: Vec<f64> = (0..topo.node_count())
        .map(|i| topo.degree(i) as f64)
        .collect();
    let high_degree_nodes = match percentile(&degrees, config.high_degree_percentile) {
        Some(threshold) => degrees
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d > 0.0 && d >= threshold)
            .map(|(i, _)| topo.ids[i].clone())
            .collect(),
        None => Vec::new(),
    };

    tracing::debug!(
        nodes = topo.node_count(),
        articulation_points = cut.articulation.iter().filter(|&&f| f).count(),
        degraded = degraded.len(),
        "structural analysis complete"
    );

    StructuralAnalysis {
        centrality,
        single_points_of_failure: names(&cut.articulation),
        bridge_nodes: names(&cut.bridge_endpoint),
        high_degree_nodes,
        degraded_metrics: degraded,
    }
}

// ── Centrality ───────────────────────────────────────────────────

/// `(in + out) / (V - 1)`. A graph of one node scores 1.
pub fn degree_centrality(topo: &Topology) -> Vec<f64> {
    let n = topo.node_count();
    if n <= 1 {
        return vec![1.0; n];
    }
    let scale = 1.0 / (n - 1) as f64;
    (0..n).map(|i| topo.degree(i) as f64 * scale).collect()
}

/// Brandes betweenness over unweighted directed shortest paths,
/// normalized by `(V-1)(V-2)`.
pub fn betweenness_centrality(topo: &Topology, cancel: &CancelToken) -> Measure {
    let n = topo.node_count();
    let mut bc = vec![0.0; n];

    for s in 0..n {
        if cancel.is_cancelled() {
            return Err(Fallback::Cancelled);
        }

        let mut order = Vec::with_capacity(n);
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0_f64; n];
        let mut dist: Vec<Option<usize>> = vec![None; n];
        sigma[s] = 1.0;
        dist[s] = Some(0);

        let mut queue = VecDeque::from([s]);
        while let Some(v) = queue.pop_front() {
            order.push(v);
            let dv = dist[v].unwrap_or(0);
            for &w in &topo.out[v] {
                if dist[w].is_none() {
                    dist[w] = Some(dv + 1);
                    queue.push_back(w);
                }
                if dist[w] == Some(dv + 1) {
                    sigma[w] += sigma[v];
                    preds[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0; n];
        while let Some(w) = order.pop() {
            for &v in &preds[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                bc[w] += delta[w];
            }
        }
    }

    if n > 2 {
        let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
        for value in &mut bc {
            *value *= scale;
        }
    }
    Ok(bc)
}

/// Closeness over inward distances, scaled by the reachable fraction
/// (Wasserman–Faust) so partially reachable nodes compare fairly.
pub fn closeness_centrality(topo: &Topology, cancel: &CancelToken) -> Measure {
    let n = topo.node_count();
    let mut closeness = vec![0.0; n];

    for u in 0..n {
        if cancel.is_cancelled() {
            return Err(Fallback::Cancelled);
        }

        let mut dist: Vec<Option<usize>> = vec![None; n];
        dist[u] = Some(0);
        let mut queue = VecDeque::from([u]);
        let mut total = 0usize;
        let mut reached = 1usize;

        while let Some(v) = queue.pop_front() {
            let dv = dist[v].unwrap_or(0);
            for &w in &topo.inc[v] {
                if dist[w].is_none() {
                    dist[w] = Some(dv + 1);
                    total += dv + 1;
                    reached += 1;
                    queue.push_back(w);
                }
            }
        }

        if total > 0 && n > 1 {
            let others = (reached - 1) as f64;
            closeness[u] = (others / total as f64) * (others / (n - 1) as f64);
        }
    }
    Ok(closeness)
}

/// Power-iteration PageRank with uniform teleport and dangling
/// redistribution. Converged when the L1 change drops below `V × tolerance`.
pub fn pagerank(topo: &Topology, config: &StructuralConfig, cancel: &CancelToken) -> Measure {
    let n = topo.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let alpha = config.damping;
    let uniform = 1.0 / n as f64;
    let dangling: Vec<usize> = (0..n).filter(|&i| topo.out_degree(i) == 0).collect();
    let mut x = vec![uniform; n];

    for _ in 0..config.max_iterations {
        if cancel.is_cancelled() {
            return Err(Fallback::Cancelled);
        }

        let last = x;
        let dangle_sum: f64 = alpha * dangling.iter().map(|&i| last[i]).sum::<f64>();
        let base = dangle_sum * uniform + (1.0 - alpha) * uniform;
        x = vec![base; n];

        for (i, targets) in topo.out.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = alpha * last[i] / targets.len() as f64;
            for &t in targets {
                x[t] += share;
            }
        }

        let err: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if !err.is_finite() {
            return Err(Fallback::Numerical("non-finite pagerank update"));
        }
        if err < n as f64 * config.tolerance {
            return Ok(x);
        }
    }

    Err(Fallback::NotConverged {
        iterations: config.max_iterations,
    })
}

/// Eigenvector centrality over in-edges, iterating `(A^T + I)` with L2
/// normalization.
pub fn eigenvector_centrality(
    topo: &Topology,
    config: &StructuralConfig,
    cancel: &CancelToken,
) -> Measure {
    let n = topo.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut x = vec![1.0 / n as f64; n];

    for _ in 0..config.max_iterations {
        if cancel.is_cancelled() {
            return Err(Fallback::Cancelled);
        }

        let last = x;
        x = last.clone();
        for (i, targets) in topo.out.iter().enumerate() {
            for &t in targets {
                x[t] += last[i];
            }
        }

        let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(Fallback::Numerical("degenerate eigenvector norm"));
        }
        for value in &mut x {
            *value /= norm;
        }

        let err: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if err < n as f64 * config.tolerance {
            return Ok(x);
        }
    }

    Err(Fallback::NotConverged {
        iterations: config.max_iterations,
    })
}

// ── Articulation points and bridges ──────────────────────────────

struct CutStructure {
    articulation: Vec<bool>,
    bridge_endpoint: Vec<bool>,
}

/// Iterative Tarjan low-link over a simple undirected adjacency list.
fn cut_structure(adjacency: &[Vec<usize>]) -> CutStructure {
    let n = adjacency.len();
    let mut disc: Vec<Option<usize>> = vec![None; n];
    let mut low = vec![0usize; n];
    let mut parent: Vec<Option<usize>> = vec![None; n];
    let mut articulation = vec![false; n];
    let mut bridge_endpoint = vec![false; n];
    let mut timer = 0usize;

    for root in 0..n {
        if disc[root].is_some() {
            continue;
        }
        disc[root] = Some(timer);
        low[root] = timer;
        timer += 1;
        let mut root_children = 0;

        // (node, position of the next neighbour to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(top) = stack.last_mut() {
            let u = top.0;
            if top.1 < adjacency[u].len() {
                let v = adjacency[u][top.1];
                top.1 += 1;
                match disc[v] {
                    None => {
                        parent[v] = Some(u);
                        disc[v] = Some(timer);
                        low[v] = timer;
                        timer += 1;
                        if u == root {
                            root_children += 1;
                        }
                        stack.push((v, 0));
                    }
                    Some(dv) if parent[u] != Some(v) => {
                        low[u] = low[u].min(dv);
                    }
                    Some(_) => {}
                }
            } else {
                stack.pop();
                if let Some(&(p, _)) = stack.last() {
                    low[p] = low[p].min(low[u]);
                    let dp = disc[p].unwrap_or(0);
                    if low[u] > dp {
                        bridge_endpoint[p] = true;
                        bridge_endpoint[u] = true;
                    }
                    if p != root && low[u] >= dp {
                        articulation[p] = true;
                    }
                }
            }
        }

        if root_children > 1 {
            articulation[root] = true;
        }
    }

    CutStructure {
        articulation,
        bridge_endpoint,
    }
}
