//! Configuration module for the collaboration runtime
//!
//! Agents, the LLM endpoint, memory and tool limits, MCP servers, and logging
//! are described in a single YAML document.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::EnsembleError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<EnsembleConfig, EnsembleError> {
    ConfigLoader::from_file(path).await
}
