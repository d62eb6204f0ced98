//! Asset Harvester Library
//!
//! Resolves a versioned manifest of remote bundle identifiers into a local,
//! organized image/audio/prefab library. This library exposes the internal
//! modules for testing and potential reuse.

pub mod classify;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod manifest;
pub mod organize;
pub mod pipeline;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig};
pub use manifest::ManifestType;
pub use pipeline::{production_pipeline, HarvestSummary, Pipeline, RefreshSummary};
