//! Core domain types for the Guardian dependency graph.
//!
//! Nodes are vendors or internal systems, edges are directed dependencies
//! between them. Every record carries a typed core schema plus an open
//! `metadata` map for attributes the engine does not interpret.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GuardianError, Result};

/// Open extension map attached to nodes and edges.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ── Tier ──────────────────────────────────────────────────────────

/// Business tier of a node. Tier 1 is the most critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Tier(u8);

impl Tier {
    pub const CRITICAL: Tier = Tier(1);
    pub const IMPORTANT: Tier = Tier(2);
    pub const STANDARD: Tier = Tier(3);

    pub fn new(value: u8) -> Result<Self> {
        match value {
            1..=3 => Ok(Self(value)),
            other => Err(GuardianError::Validation(format!(
                "tier must be 1, 2 or 3 (got {other})"
            ))),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// All tiers in ascending order.
    pub fn all() -> [Tier; 3] {
        [Self::CRITICAL, Self::IMPORTANT, Self::STANDARD]
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl TryFrom<u8> for Tier {
    type Error = GuardianError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier.0
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier_{}", self.0)
    }
}

// ── Node Types ────────────────────────────────────────────────────

/// Lifecycle status stored on a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Secure,
    Compromised,
    Propagating,
    Affected,
    Isolated,
}

/// Contract horizon with a vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractTerm {
    ShortTerm,
    LongTerm,
    #[default]
    Unknown,
}

/// Vendor due-diligence attributes used by base-risk scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorProfile {
    #[serde(default)]
    pub last_audit: Option<DateTime<Utc>>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub contract: ContractTerm,
}

/// A vendor or system in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub tier: Tier,
    /// Stored base risk (0.0–1.0).
    #[serde(default)]
    pub risk_score: f64,
    /// Business criticality (0–100). Higher values resist propagation.
    #[serde(default)]
    pub criticality_score: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub profile: VendorProfile,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Node {
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            tier,
            risk_score: 0.0,
            criticality_score: 0.0,
            category: String::new(),
            status: NodeStatus::Secure,
            profile: VendorProfile::default(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_risk_score(mut self, risk_score: f64) -> Self {
        self.risk_score = risk_score;
        self
    }

    pub fn with_criticality(mut self, criticality_score: f64) -> Self {
        self.criticality_score = criticality_score;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_profile(mut self, profile: VendorProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Check score ranges. Tier validity is enforced by [`Tier`] itself.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(GuardianError::Validation("node id must not be empty".into()));
        }
        check_range("risk_score", &self.id, self.risk_score, 0.0, 1.0)?;
        check_range("criticality_score", &self.id, self.criticality_score, 0.0, 100.0)
    }
}

// ── Edge Types ────────────────────────────────────────────────────

/// The kind of dependency an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    DependsOn,
    IntegratesWith,
    Supplies,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DependsOn => "depends_on",
            Self::IntegratesWith => "integrates_with",
            Self::Supplies => "supplies",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeCriticality {
    Low,
    #[default]
    Medium,
    High,
}

/// A directed dependency: compromise can flow from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    /// Free-form category such as `authentication`, `api_call`, `data_flow`.
    #[serde(default)]
    pub category: String,
    /// Coupling strength (0.0–1.0).
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub criticality: EdgeCriticality,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_strength() -> f64 {
    0.5
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
            category: String::new(),
            strength: default_strength(),
            criticality: EdgeCriticality::Medium,
            metadata: Metadata::new(),
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_criticality(mut self, criticality: EdgeCriticality) -> Self {
        self.criticality = criticality;
        self
    }

    /// `source→target` label used for edge mitigation targets.
    pub fn label(&self) -> String {
        edge_label(&self.source, &self.target)
    }

    pub fn validate(&self) -> Result<()> {
        let id = self.label();
        check_range("strength", &id, self.strength, 0.0, 1.0)
    }
}

pub fn edge_label(source: &str, target: &str) -> String {
    format!("{source}→{target}")
}

fn check_range(field: &str, owner: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(GuardianError::Validation(format!(
            "{field} of {owner} must be within [{min}, {max}] (got {value})"
        )));
    }
    Ok(())
}

// ── Risk Types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a score in `[0, 1]`: ≥0.8 critical, ≥0.6 high, ≥0.3 medium.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Reason tags attached to a node's risk profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    HighBaseRisk,
    CriticalStructuralPosition,
    HighCascadeAmplification,
    HighCentrality,
    CriticalTier,
    /// No single component stands out.
    ModerateAcrossFactors,
}

// ── Mitigation Types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    IsolateNode,
    RemoveEdge,
}

/// Implementation effort. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}
