//! Configuration management for the Guardian engine.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`GUARDIAN__` prefix, `__` between sections)
//! 2. Config file (`guardian.toml`, `.yaml` or `.json`)
//! 3. Defaults

use serde::Deserialize;

use crate::error::{GuardianError, Result};

/// Environment variable prefix for overrides, e.g. `GUARDIAN__SIMULATION__MAX_WAVES=10`.
pub const ENV_PREFIX: &str = "GUARDIAN";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub structural: StructuralConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub mitigation: MitigationConfig,
}

impl EngineConfig {
    /// Load from an optional config file plus environment overrides.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = cfg.try_deserialize()?;
        loaded.validate()?;
        tracing::debug!(file_prefix, "engine configuration loaded");
        Ok(loaded)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        self.structural.validate()?;
        self.risk.validate()?;
        self.mitigation.validate()
    }
}

fn invalid(msg: String) -> GuardianError {
    GuardianError::Validation(msg)
}

fn check_percentile(name: &str, value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(invalid(format!("{name} must be within [0, 100] (got {value})")));
    }
    Ok(())
}

// ── Simulation ────────────────────────────────────────────────────

/// Cascade simulator budgets and propagation rules.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Maximum number of propagation waves (default 20).
    #[serde(default = "default_max_waves")]
    pub max_waves: usize,

    /// Simulated clock budget (default 10000).
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed: f64,

    /// Delay assigned to an edge before modifiers (default 300).
    #[serde(default = "default_base_delay")]
    pub base_delay: f64,

    /// Floor applied to modified delays (default 50).
    #[serde(default = "default_min_delay")]
    pub min_delay: f64,

    /// Depth of the structural paths attached to each result (default 3).
    #[serde(default = "default_path_depth")]
    pub path_depth: usize,

    /// Cap on enumerated structural paths (default 10000).
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,

    #[serde(default)]
    pub rules: PropagationRules,
}

/// A multiplicative modifier applied to an edge's probability and delay.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PropagationRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_factor")]
    pub probability_factor: f64,
    #[serde(default = "default_factor")]
    pub delay_factor: f64,
}

impl PropagationRule {
    pub const fn new(probability_factor: f64, delay_factor: f64) -> Self {
        Self {
            enabled: true,
            probability_factor,
            delay_factor,
        }
    }
}

/// The five propagation modifiers.
#[derive(Debug, Clone, Deserialize)]
pub struct PropagationRules {
    /// Source node is tier 1.
    #[serde(default = "default_tier_rule")]
    pub tier_amplification: PropagationRule,

    /// Edge category is `authentication`.
    #[serde(default = "default_auth_rule")]
    pub authentication: PropagationRule,

    /// Edge category is `api_call`, `api` or `integration`, or the edge integrates.
    #[serde(default = "default_api_rule")]
    pub api_integration: PropagationRule,

    /// Edge strength above `strong_dependency_threshold`.
    #[serde(default = "default_strong_rule")]
    pub strong_dependency: PropagationRule,

    /// Target in-degree at or above `high_in_degree_percentile`.
    #[serde(default = "default_in_degree_rule")]
    pub high_in_degree: PropagationRule,

    #[serde(default = "default_strong_threshold")]
    pub strong_dependency_threshold: f64,

    #[serde(default = "default_in_degree_percentile")]
    pub high_in_degree_percentile: f64,
}

impl Default for PropagationRules {
    fn default() -> Self {
        Self {
            tier_amplification: default_tier_rule(),
            authentication: default_auth_rule(),
            api_integration: default_api_rule(),
            strong_dependency: default_strong_rule(),
            high_in_degree: default_in_degree_rule(),
            strong_dependency_threshold: default_strong_threshold(),
            high_in_degree_percentile: default_in_degree_percentile(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_waves: default_max_waves(),
            max_elapsed: default_max_elapsed(),
            base_delay: default_base_delay(),
            min_delay: default_min_delay(),
            path_depth: default_path_depth(),
            max_paths: default_max_paths(),
            rules: PropagationRules::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_waves == 0 {
            return Err(invalid("simulation.max_waves must be at least 1".into()));
        }
        if self.path_depth == 0 {
            return Err(invalid("simulation.path_depth must be at least 1".into()));
        }
        if !(self.max_elapsed > 0.0) || !(self.base_delay >= 0.0) || !(self.min_delay >= 0.0) {
            return Err(invalid(
                "simulation time budget and delays must be non-negative".into(),
            ));
        }
        let rules = [
            self.rules.tier_amplification,
            self.rules.authentication,
            self.rules.api_integration,
            self.rules.strong_dependency,
            self.rules.high_in_degree,
        ];
        if rules
            .iter()
            .any(|r| !(r.probability_factor >= 0.0) || !(r.delay_factor >= 0.0))
        {
            return Err(invalid("propagation rule factors must be non-negative".into()));
        }
        check_percentile(
            "simulation.rules.high_in_degree_percentile",
            self.rules.high_in_degree_percentile,
        )
    }
}

fn default_max_waves() -> usize {
    20
}

fn default_max_elapsed() -> f64 {
    10_000.0
}

fn default_base_delay() -> f64 {
    300.0
}

fn default_min_delay() -> f64 {
    50.0
}

fn default_path_depth() -> usize {
    3
}

fn default_max_paths() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_factor() -> f64 {
    1.0
}

fn default_tier_rule() -> PropagationRule {
    PropagationRule::new(1.5, 0.7)
}

fn default_auth_rule() -> PropagationRule {
    PropagationRule::new(2.0, 0.5)
}

fn default_api_rule() -> PropagationRule {
    PropagationRule::new(1.3, 0.8)
}

fn default_strong_rule() -> PropagationRule {
    PropagationRule::new(1.4, 0.9)
}

fn default_in_degree_rule() -> PropagationRule {
    PropagationRule::new(1.2, 1.0)
}

fn default_strong_threshold() -> f64 {
    0.8
}

fn default_in_degree_percentile() -> f64 {
    75.0
}

// ── Structural ────────────────────────────────────────────────────

/// Iterative centrality settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StructuralConfig {
    /// Iteration cap for PageRank and eigenvector centrality (default 1000).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Convergence tolerance (default 1e-6).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// PageRank damping factor (default 0.85).
    #[serde(default = "default_damping")]
    pub damping: f64,

    /// Percentile of total degree that marks a high-degree node (default 90).
    #[serde(default = "default_high_degree_percentile")]
    pub high_degree_percentile: f64,

    /// Optional wall-clock budget in milliseconds for one analysis.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            damping: default_damping(),
            high_degree_percentile: default_high_degree_percentile(),
            timeout_ms: None,
        }
    }
}

impl StructuralConfig {
    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(invalid("structural.max_iterations must be at least 1".into()));
        }
        if !(self.tolerance > 0.0) {
            return Err(invalid("structural.tolerance must be positive".into()));
        }
        if !(self.damping > 0.0 && self.damping < 1.0) {
            return Err(invalid(format!(
                "structural.damping must be within (0, 1) (got {})",
                self.damping
            )));
        }
        check_percentile("structural.high_degree_percentile", self.high_degree_percentile)
    }
}

fn default_max_iterations() -> usize {
    1000
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_damping() -> f64 {
    0.85
}

fn default_high_degree_percentile() -> f64 {
    90.0
}

// ── Risk ──────────────────────────────────────────────────────────

/// Weights of the four risk components. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RiskWeights {
    #[serde(default = "default_base_weight")]
    pub base: f64,
    #[serde(default = "default_structural_weight")]
    pub structural: f64,
    #[serde(default = "default_cascade_weight")]
    pub cascade: f64,
    #[serde(default = "default_centrality_weight")]
    pub centrality: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            base: default_base_weight(),
            structural: default_structural_weight(),
            cascade: default_cascade_weight(),
            centrality: default_centrality_weight(),
        }
    }
}

/// Per-tier multipliers applied to the weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TierMultipliers {
    #[serde(default = "default_tier_1_multiplier")]
    pub tier_1: f64,
    #[serde(default = "default_tier_2_multiplier")]
    pub tier_2: f64,
    #[serde(default = "default_tier_3_multiplier")]
    pub tier_3: f64,
}

impl TierMultipliers {
    pub fn for_tier(&self, tier: crate::types::Tier) -> f64 {
        match tier.value() {
            1 => self.tier_1,
            2 => self.tier_2,
            _ => self.tier_3,
        }
    }
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            tier_1: default_tier_1_multiplier(),
            tier_2: default_tier_2_multiplier(),
            tier_3: default_tier_3_multiplier(),
        }
    }
}

/// Risk scorer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub weights: RiskWeights,

    #[serde(default)]
    pub tier_multipliers: TierMultipliers,

    /// Audits older than this many days count as stale (default 365).
    #[serde(default = "default_audit_max_age_days")]
    pub audit_max_age_days: i64,

    /// Depth of the scored critical-path search (default 3).
    #[serde(default = "default_critical_path_depth")]
    pub critical_path_depth: usize,

    /// Path risk above which a scored path counts as critical (default 0.6).
    #[serde(default = "default_critical_path_threshold")]
    pub critical_path_threshold: f64,

    /// Scored paths kept per source node (default 20).
    #[serde(default = "default_paths_per_source")]
    pub paths_per_source: usize,

    /// DFS expansions allowed per source in the critical-path search
    /// (default 10 000).
    #[serde(default = "default_critical_path_budget")]
    pub critical_path_budget: usize,

    /// Sub-score above which a contributing factor is reported (default 0.6).
    #[serde(default = "default_factor_threshold")]
    pub factor_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            tier_multipliers: TierMultipliers::default(),
            audit_max_age_days: default_audit_max_age_days(),
            critical_path_depth: default_critical_path_depth(),
            critical_path_threshold: default_critical_path_threshold(),
            paths_per_source: default_paths_per_source(),
            critical_path_budget: default_critical_path_budget(),
            factor_threshold: default_factor_threshold(),
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<()> {
        let w = &self.weights;
        let parts = [w.base, w.structural, w.cascade, w.centrality];
        if parts.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(invalid("risk weights must be non-negative".into()));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(invalid(format!("risk weights must sum to 1 (got {sum})")));
        }
        let m = &self.tier_multipliers;
        if [m.tier_1, m.tier_2, m.tier_3]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(invalid("tier multipliers must be non-negative".into()));
        }
        if self.critical_path_depth == 0 {
            return Err(invalid("risk.critical_path_depth must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_base_weight() -> f64 {
    0.25
}

fn default_structural_weight() -> f64 {
    0.30
}

fn default_cascade_weight() -> f64 {
    0.25
}

fn default_centrality_weight() -> f64 {
    0.20
}

fn default_tier_1_multiplier() -> f64 {
    3.0
}

fn default_tier_2_multiplier() -> f64 {
    2.0
}

fn default_tier_3_multiplier() -> f64 {
    1.0
}

fn default_audit_max_age_days() -> i64 {
    365
}

fn default_critical_path_depth() -> usize {
    3
}

fn default_critical_path_threshold() -> f64 {
    0.6
}

fn default_paths_per_source() -> usize {
    20
}

fn default_critical_path_budget() -> usize {
    10_000
}

fn default_factor_threshold() -> f64 {
    0.6
}

// ── Mitigation ────────────────────────────────────────────────────

/// Mitigation search settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MitigationConfig {
    /// Node isolation candidates taken from path frequency (default 5).
    #[serde(default = "default_top_k")]
    pub top_k_nodes: usize,

    /// Edge removal candidates taken from path frequency (default 5).
    #[serde(default = "default_top_k")]
    pub top_k_edges: usize,

    /// Hard cap on evaluated candidates (default 50).
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Lower bound on the evaluation depth (default 3).
    #[serde(default = "default_min_eval_depth")]
    pub min_evaluation_depth: usize,

    /// Paths counted per baseline or counterfactual before the count is
    /// reported as truncated (default 1 000 000). Counting does not store
    /// paths, so this can sit well above `simulation.max_paths`.
    #[serde(default = "default_max_counted_paths")]
    pub max_counted_paths: usize,

    /// Evaluate candidates on the rayon pool (default true).
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Re-run the stochastic cascade per candidate (default true).
    #[serde(default = "default_true")]
    pub resimulate: bool,
}

impl Default for MitigationConfig {
    fn default() -> Self {
        Self {
            top_k_nodes: default_top_k(),
            top_k_edges: default_top_k(),
            max_candidates: default_max_candidates(),
            min_evaluation_depth: default_min_eval_depth(),
            max_counted_paths: default_max_counted_paths(),
            parallel: true,
            resimulate: true,
        }
    }
}

impl MitigationConfig {
    fn validate(&self) -> Result<()> {
        if self.min_evaluation_depth == 0 {
            return Err(invalid(
                "mitigation.min_evaluation_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_top_k() -> usize {
    5
}

fn default_max_candidates() -> usize {
    50
}

fn default_max_counted_paths() -> usize {
    1_000_000
}

fn default_min_eval_depth() -> usize {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.simulation.max_waves, 20);
        assert_eq!(config.simulation.max_elapsed, 10_000.0);
        assert_eq!(config.simulation.rules.authentication.probability_factor, 2.0);
        assert_eq!(config.structural.max_iterations, 1000);
        assert_eq!(config.risk.tier_multipliers.tier_1, 3.0);
        assert_eq!(config.risk.critical_path_budget, 10_000);
        assert_eq!(config.mitigation.max_candidates, 50);
        assert_eq!(config.mitigation.max_counted_paths, 1_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
[simulation]
max_waves = 5

[simulation.rules.authentication]
enabled = false

[risk.weights]
base = 0.4
structural = 0.2
cascade = 0.2
centrality = 0.2
"#;
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = EngineConfig::load(&path).unwrap();

        assert_eq!(config.simulation.max_waves, 5);
        assert_eq!(config.simulation.base_delay, 300.0);
        assert!(!config.simulation.rules.authentication.enabled);
        assert!(config.simulation.rules.tier_amplification.enabled);
        assert_eq!(config.risk.weights.base, 0.4);
        assert_eq!(config.structural.damping, 0.85);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EngineConfig::load("/nonexistent/guardian-config").unwrap();
        assert_eq!(config.mitigation.top_k_nodes, 5);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = EngineConfig::default();
        config.risk.weights.base = 0.5;
        assert!(config.validate().is_err());

        config.risk.weights = RiskWeights {
            base: 1.2,
            structural: -0.2,
            cascade: 0.0,
            centrality: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_budgets_rejected() {
        let mut config = EngineConfig::default();
        config.simulation.path_depth = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.structural.damping = 1.0;
        assert!(config.validate().is_err());
    }
}
