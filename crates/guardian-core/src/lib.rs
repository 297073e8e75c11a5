//! guardian-core: Shared types, configuration, and error handling for the Guardian risk engine.
//!
//! This crate provides the foundational types used across all Guardian components:
//! - Node and edge records for the vendor dependency graph
//! - Classification enums (tiers, edge types, risk levels, mitigation actions)
//! - Engine configuration with file and environment overrides
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::GuardianError;
