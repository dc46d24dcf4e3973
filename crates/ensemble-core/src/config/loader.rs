//! Configuration loader for YAML files and environment resolution

use crate::config::types::*;
use crate::errors::EnsembleError;
use std::env;
use std::path::Path;
use tokio::fs;

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<EnsembleConfig, EnsembleError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            EnsembleError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<EnsembleConfig, EnsembleError> {
        let mut config: EnsembleConfig = serde_yaml::from_str(content).map_err(|e| {
            EnsembleError::ConfigError(format!("Failed to parse YAML config: {}", e))
        })?;

        Self::resolve_environment(&mut config)?;

        config.validate()?;

        Ok(config)
    }

    fn resolve_environment(config: &mut EnsembleConfig) -> Result<(), EnsembleError> {
        if config.llm.api_key.is_none() {
            if let Some(var) = &config.llm.api_key_env {
                match env::var(var) {
                    Ok(value) => config.llm.api_key = Some(value),
                    Err(_) => {
                        return Err(EnsembleError::ConfigError(format!(
                            "Environment variable '{}' for LLM api key is not set",
                            var
                        )))
                    }
                }
            }
        }

        for server in &mut config.mcp_servers {
            for value in server.command.env.values_mut() {
                if let Some(var) = value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
                    *value = env::var(var).map_err(|_| {
                        EnsembleError::ConfigError(format!(
                            "Environment variable '{}' referenced by MCP server '{}' is not set",
                            var, server.name
                        ))
                    })?;
                }
            }
        }

        Ok(())
    }
}
