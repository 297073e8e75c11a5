//! Error types for the guardian-engine crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Graph error: {0}")]
    Graph(#[from] guardian_graph::GraphError),

    #[error("Configuration error: {0}")]
    Config(#[from] guardian_core::GuardianError),

    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Caller-input problems, as opposed to internal failures.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Serialization(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
