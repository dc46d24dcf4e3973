//! Tool system for extending agent capabilities
//!
//! The registry merges built-in tools with tools discovered from external
//! sources. External tools are registered as `"{source}_{tool}"`, and
//! rediscovery overwrites same-named entries. Every execution goes through a
//! TTL and size bounded result cache and an execution tracker. Failures of any
//! kind come back as a failed [`ToolOutcome`], never as an error.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ToolsConfig;
use crate::errors::EnsembleError;
use crate::llm::ToolMetadata;

pub mod builtin;
pub mod cache;
pub mod mcp_client;
pub mod rmcp_client;
pub mod tracker;

pub use builtin::{TextExtractKeywordsTool, TextSummarizeTool};
pub use cache::{CacheStats, ToolResultCache};
pub use mcp_client::{ExternalToolInfo, ExternalTools, MockExternalTools};
pub use rmcp_client::{McpToolServers, RMCPClient};
pub use tracker::{ExecutionRecord, ExecutionTracker, ToolStats};

// Core Tool trait that every built-in tool implements
#[async_trait]
pub trait Tool: Send + Sync {
    fn capability(&self) -> ToolCapability;
    async fn execute(&self, arguments: Value) -> Result<Value, EnsembleError>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolCapability {
    pub name: String,
    pub description: String,
    pub category: String,
    pub parameters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_server: Option<String>,
    pub is_builtin: bool,
}

impl ToolCapability {
    pub fn builtin(name: &str, description: &str, category: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            parameters,
            source_server: None,
            is_builtin: true,
        }
    }

    pub fn external(source: &str, info: &ExternalToolInfo) -> Self {
        Self {
            name: format!("{}_{}", source, info.name),
            description: info.description.clone(),
            category: source.to_string(),
            parameters: info.input_schema.clone(),
            source_server: Some(source.to_string()),
            is_builtin: false,
        }
    }

    /// Case-insensitive substring match on name, description, or category.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
            || self.category.to_lowercase().contains(&query)
    }

    pub fn to_metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.parameters.clone(),
        }
    }
}

/// Result of a tool execution as seen by callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolOutcome {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn into_tuple(self) -> (bool, Option<Value>, Option<String>) {
        (self.success, self.result, self.error)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub total_tools: usize,
    pub builtin_tools: usize,
    pub external_tools: usize,
    pub tool_statistics: BTreeMap<String, ToolStats>,
    pub most_used_tools: Vec<(String, u64)>,
    pub cache_stats: CacheStats,
}

pub struct ToolRegistry {
    capabilities: BTreeMap<String, ToolCapability>,
    builtins: HashMap<String, Arc<dyn Tool>>,
    external: Option<Arc<dyn ExternalTools>>,
    cache: ToolResultCache,
    tracker: ExecutionTracker,
}

impl ToolRegistry {
    pub fn new(config: &ToolsConfig) -> Self {
        let mut registry = Self {
            capabilities: BTreeMap::new(),
            builtins: HashMap::new(),
            external: None,
            cache: ToolResultCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_max_size,
            ),
            tracker: ExecutionTracker::new(config.history_limit),
        };
        registry.register_tool(Arc::new(TextSummarizeTool::new()));
        registry.register_tool(Arc::new(TextExtractKeywordsTool::new()));
        registry
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let capability = tool.capability();
        self.builtins.insert(capability.name.clone(), tool);
        self.capabilities.insert(capability.name.clone(), capability);
    }

    /// Register every tool the external source lists and return the full capability list.
    ///
    /// Listing failures are logged and leave previously registered tools in place.
    pub async fn discover(&mut self, external: Arc<dyn ExternalTools>) -> Vec<ToolCapability> {
        match external.list_tools().await {
            Ok(sources) => {
                for (source, tools) in sources {
                    for info in &tools {
                        let capability = ToolCapability::external(&source, info);
                        log::debug!("Registered external tool {}", capability.name);
                        self.capabilities.insert(capability.name.clone(), capability);
                    }
                    log::info!("Discovered {} tools from {}", tools.len(), source);
                }
            }
            Err(e) => log::error!("Error discovering external tools: {}", e),
        }
        self.external = Some(external);
        self.list_tools()
    }

    pub fn list_tools(&self) -> Vec<ToolCapability> {
        self.capabilities.values().cloned().collect()
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolCapability> {
        self.capabilities.get(name)
    }

    pub fn tool_metadata(&self) -> Vec<ToolMetadata> {
        self.capabilities.values().map(ToolCapability::to_metadata).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    pub fn tool_count(&self) -> usize {
        self.capabilities.len()
    }

    pub fn categories(&self) -> Vec<String> {
        self.capabilities
            .values()
            .map(|c| c.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn search(&self, query: Option<&str>, category: Option<&str>) -> Vec<ToolCapability> {
        self.capabilities
            .values()
            .filter(|c| category.map_or(true, |cat| c.category == cat))
            .filter(|c| query.map_or(true, |q| c.matches_query(q)))
            .cloned()
            .collect()
    }

    pub async fn execute(&mut self, name: &str, arguments: Value, use_cache: bool) -> ToolOutcome {
        if use_cache {
            if let Some(cached) = self.cache.get(name, &arguments) {
                self.tracker
                    .record(name, &arguments, Some(&cached), true, 0.0, None);
                return ToolOutcome::success(cached);
            }
        }

        let Some(capability) = self.capabilities.get(name).cloned() else {
            return ToolOutcome::failure(format!("Tool '{}' not found", name));
        };

        let started = Instant::now();
        let result = if capability.is_builtin {
            match self.builtins.get(name) {
                Some(tool) => tool.execute(arguments.clone()).await,
                None => Err(EnsembleError::InternalError(format!(
                    "Built-in tool '{}' has no handler",
                    name
                ))),
            }
        } else {
            let Some(external) = self.external.clone() else {
                return ToolOutcome::failure("MCP client not available");
            };
            let Some((source, tool)) = split_external_name(&capability) else {
                return ToolOutcome::failure(format!("Invalid tool name format: {}", name));
            };
            external.call_tool(&source, &tool, arguments.clone()).await
        };
        let duration = started.elapsed().as_secs_f64();

        match result {
            Ok(value) => {
                if use_cache {
                    self.cache.set(name, &arguments, value.clone());
                }
                self.tracker
                    .record(name, &arguments, Some(&value), true, duration, None);
                ToolOutcome::success(value)
            }
            Err(e) => {
                let message = e.to_string();
                log::warn!("Tool '{}' failed: {}", name, message);
                self.tracker
                    .record(name, &arguments, None, false, duration, Some(message.clone()));
                ToolOutcome::failure(message)
            }
        }
    }

    pub fn get_tool_statistics(&self, name: &str) -> Option<ToolStats> {
        self.tracker.get_tool_statistics(name)
    }

    pub fn get_execution_history(&self, name: Option<&str>, limit: usize) -> Vec<ExecutionRecord> {
        self.tracker.get_execution_history(name, limit)
    }

    pub fn get_most_used_tools(&self, limit: usize) -> Vec<(String, u64)> {
        self.tracker.get_most_used_tools(limit)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn execution_report(&self) -> ExecutionReport {
        let builtin_tools = self.capabilities.values().filter(|c| c.is_builtin).count();
        ExecutionReport {
            total_tools: self.capabilities.len(),
            builtin_tools,
            external_tools: self.capabilities.len() - builtin_tools,
            tool_statistics: self.tracker.all_statistics(),
            most_used_tools: self.tracker.get_most_used_tools(5),
            cache_stats: self.cache.stats(),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(&ToolsConfig::default())
    }
}

fn split_external_name(capability: &ToolCapability) -> Option<(String, String)> {
    if let Some(source) = &capability.source_server {
        if let Some(tool) = capability
            .name
            .strip_prefix(source.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
        {
            if !tool.is_empty() {
                return Some((source.clone(), tool.to_string()));
            }
        }
    }
    capability
        .name
        .split_once('_')
        .filter(|(source, tool)| !source.is_empty() && !tool.is_empty())
        .map(|(source, tool)| (source.to_string(), tool.to_string()))
}
