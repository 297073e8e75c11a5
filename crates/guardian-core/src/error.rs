use thiserror::Error;

/// Top-level error type for the Guardian platform.
#[derive(Error, Debug)]
pub enum GuardianError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GuardianError>;
