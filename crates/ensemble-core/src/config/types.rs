//! Configuration types for an ensemble of collaborating agents

use crate::errors::EnsembleError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Top-level configuration loaded from `ensemble.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub agents: Vec<AgentDefinition>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    #[serde(default)]
    pub collaboration: CollaborationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A participant in the ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: default_system_prompt(),
            constraints: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }
}

fn default_system_prompt() -> String {
    "You are a helpful assistant collaborating with other agents.".to_string()
}

/// OpenAI-compatible completion endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: None,
            api_key: None,
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_short_term_capacity")]
    pub short_term_capacity: usize,
    /// SQLite file for long-term memory and task history. In-memory when unset.
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
}

fn default_short_term_capacity() -> usize {
    20
}

fn default_context_messages() -> usize {
    10
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: default_short_term_capacity(),
            database: None,
            context_messages: default_context_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_max_size() -> usize {
    100
}

fn default_history_limit() -> usize {
    1000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_size: default_cache_max_size(),
            history_limit: default_history_limit(),
        }
    }
}

/// An external tool server reached over MCP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: McpCommand,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Child process used to launch an MCP server
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpCommand {
    pub run: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    /// Number of prior events handed to an agent as history on each turn
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_max_rounds() -> usize {
    5
}

fn default_stream_buffer() -> usize {
    32
}

fn default_history_window() -> usize {
    10
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            stream_buffer: default_stream_buffer(),
            history_window: default_history_window(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl EnsembleConfig {
    pub fn validate(&self) -> Result<(), EnsembleError> {
        if self.agents.is_empty() {
            return Err(EnsembleError::ConfigError(
                "At least one agent must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(EnsembleError::ConfigError(
                    "Agent name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(EnsembleError::ConfigError(format!(
                    "Duplicate agent name '{}'",
                    agent.name
                )));
            }
        }

        if self.llm.model.is_empty() {
            return Err(EnsembleError::ConfigError("LLM model cannot be empty".to_string()));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(EnsembleError::ConfigError(format!(
                "LLM temperature must be between 0 and 2, got {}",
                self.llm.temperature
            )));
        }

        if self.memory.short_term_capacity == 0 {
            return Err(EnsembleError::ConfigError(
                "Memory short_term_capacity must be greater than 0".to_string(),
            ));
        }

        if self.tools.cache_max_size == 0 {
            return Err(EnsembleError::ConfigError(
                "Tools cache_max_size must be greater than 0".to_string(),
            ));
        }

        if self.collaboration.max_rounds == 0 {
            return Err(EnsembleError::ConfigError(
                "Collaboration max_rounds must be greater than 0".to_string(),
            ));
        }

        if self.collaboration.stream_buffer == 0 {
            return Err(EnsembleError::ConfigError(
                "Collaboration stream_buffer must be greater than 0".to_string(),
            ));
        }

        for server in &self.mcp_servers {
            if server.name.is_empty() {
                return Err(EnsembleError::ConfigError(
                    "MCP server name cannot be empty".to_string(),
                ));
            }
            if server.name.contains('_') {
                return Err(EnsembleError::ConfigError(format!(
                    "MCP server name '{}' cannot contain '_'",
                    server.name
                )));
            }
            if server.enabled && server.command.run.is_empty() {
                return Err(EnsembleError::ConfigError(format!(
                    "MCP server '{}' command cannot be empty",
                    server.name
                )));
            }
        }

        Ok(())
    }

    pub fn enabled_mcp_servers(&self) -> impl Iterator<Item = &McpServerConfig> {
        self.mcp_servers.iter().filter(|s| s.enabled)
    }
}
