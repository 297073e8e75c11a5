//! Guardian Graph: the in-memory vendor dependency graph.
//!
//! This crate is the single mutation point for dependency data. Analyses
//! read it through a dense [`Topology`] snapshot; counterfactual edits are
//! made on clones so the caller's graph is never touched.

pub mod error;
pub mod graph;
pub mod records;
pub mod topology;

pub use error::GraphError;
pub use graph::DependencyGraph;
pub use records::{EdgeRecord, GraphDocument, GraphExport, GraphStatistics, NodeRecord};
pub use topology::Topology;
