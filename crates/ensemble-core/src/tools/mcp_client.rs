//! Contract for reaching tools hosted outside the process
//!
//! External tools are grouped by source (normally one MCP server per source).
//! The registry only needs to list what each source offers and to call a tool
//! on a named source; how the source is reached stays behind this trait.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::EnsembleError;

#[derive(Debug, Clone)]
pub struct ExternalToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait ExternalTools: Send + Sync {
    /// Tools offered by every reachable source, keyed by source name.
    async fn list_tools(&self) -> Result<HashMap<String, Vec<ExternalToolInfo>>, EnsembleError>;

    async fn call_tool(
        &self,
        source: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, EnsembleError>;
}

// Mock implementation for testing
pub struct MockExternalTools {
    sources: HashMap<String, Vec<ExternalToolInfo>>,
    connected: bool,
    fail_calls: bool,
    calls: AtomicUsize,
}

impl MockExternalTools {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            connected: true,
            fail_calls: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A single `mock` source exposing `echo` and `lookup`.
    pub fn with_default_tools() -> Self {
        Self::new()
            .with_tool(
                "mock",
                ExternalToolInfo {
                    name: "echo".to_string(),
                    description: "Echo the input back".to_string(),
                    input_schema: json!({
                        "type": "object",
                        "properties": {
                            "input": {"type": "string", "description": "Input parameter"}
                        },
                        "required": ["input"]
                    }),
                },
            )
            .with_tool(
                "mock",
                ExternalToolInfo {
                    name: "lookup".to_string(),
                    description: "Look up a record by key".to_string(),
                    input_schema: json!({
                        "type": "object",
                        "properties": {
                            "key": {"type": "string", "description": "Record key"}
                        },
                        "required": ["key"]
                    }),
                },
            )
    }

    pub fn with_tool(mut self, source: &str, tool: ExternalToolInfo) -> Self {
        self.sources.entry(source.to_string()).or_default().push(tool);
        self
    }

    pub fn with_connection_status(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    pub fn with_failing_calls(mut self) -> Self {
        self.fail_calls = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockExternalTools {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExternalTools for MockExternalTools {
    async fn list_tools(&self) -> Result<HashMap<String, Vec<ExternalToolInfo>>, EnsembleError> {
        if !self.connected {
            return Err(EnsembleError::MCPError("Not connected".to_string()));
        }
        Ok(self.sources.clone())
    }

    async fn call_tool(
        &self,
        source: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, EnsembleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected {
            return Err(EnsembleError::MCPError("Not connected".to_string()));
        }
        if self.fail_calls {
            return Err(EnsembleError::MCPError(format!(
                "Tool '{}' on '{}' failed",
                tool, source
            )));
        }

        Ok(Value::String(format!(
            "Mock result from {}/{} with arguments: {}",
            source, tool, arguments
        )))
    }
}
