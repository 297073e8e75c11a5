use thiserror::Error;

/// Errors raised by graph mutations and lookups. All of them are caller
/// input problems; nothing here is transient.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Edge not found: {edge}")]
    EdgeNotFound { edge: String },

    #[error("Invalid record: {0}")]
    Invalid(#[from] guardian_core::GuardianError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
