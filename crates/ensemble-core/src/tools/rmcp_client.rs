//! MCP servers launched as child processes and reached through `rmcp`.
//!
//! Each configured server becomes one [`RMCPClient`]. [`McpToolServers`] groups
//! them by server name and exposes the group as an [`ExternalTools`] source.

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParam, RawContent, ResourceContents, Tool},
    service::{DynService, RunningService, ServiceExt},
    transport::TokioChildProcess,
    RoleClient,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;

use super::mcp_client::{ExternalToolInfo, ExternalTools};
use crate::config::{McpCommand, McpServerConfig};
use crate::errors::EnsembleError;

const LIST_TOOLS_TIMEOUT: Duration = Duration::from_secs(30);
const RESPONSE_CHAR_LIMIT: usize = 20_000;
const TRUNCATION_MESSAGE: &str = " [...TRUNCATED...]";

pub struct RMCPClient {
    name: String,
    service: Option<RunningService<RoleClient, Box<dyn DynService<RoleClient>>>>,
}

impl RMCPClient {
    pub async fn connect(name: &str, mcp_command: &McpCommand) -> Result<Self, EnsembleError> {
        log::info!(
            "Starting MCP server '{}' with command: {} {:?}",
            name,
            mcp_command.run,
            mcp_command.args
        );

        let mut cmd = Command::new(&mcp_command.run);
        cmd.args(&mcp_command.args);

        if let Some(working_dir) = &mcp_command.working_dir {
            cmd.current_dir(working_dir);
        }
        for (key, value) in &mcp_command.env {
            cmd.env(key, value);
        }

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| EnsembleError::MCPError(format!("Failed to create transport: {}", e)))?;

        let service_handler: Box<dyn DynService<RoleClient>> = Box::new(());
        let service = service_handler.serve(transport).await.map_err(|e| {
            log::error!("MCP server '{}' failed to initialize: {}", name, e);
            EnsembleError::MCPError(format!("Failed to create service: {}", e))
        })?;

        log::info!("Connected to MCP server '{}': {:?}", name, service.peer_info());

        Ok(Self {
            name: name.to_string(),
            service: Some(service),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.service.is_some()
    }

    fn service(
        &self,
    ) -> Result<&RunningService<RoleClient, Box<dyn DynService<RoleClient>>>, EnsembleError> {
        self.service.as_ref().ok_or_else(|| {
            EnsembleError::MCPError(format!("MCP server '{}' is not connected", self.name))
        })
    }

    pub async fn list_tools(&self) -> Result<Vec<ExternalToolInfo>, EnsembleError> {
        let service = self.service()?;

        let response =
            tokio::time::timeout(LIST_TOOLS_TIMEOUT, service.list_tools(Default::default()))
                .await
                .map_err(|_| {
                    EnsembleError::MCPError(format!(
                        "Timeout waiting for list_tools response from '{}'",
                        self.name
                    ))
                })?
                .map_err(|e| EnsembleError::MCPError(format!("Failed to list tools: {}", e)))?;

        log::debug!("Listed {} tools from MCP server '{}'", response.tools.len(), self.name);
        Ok(response.tools.iter().map(convert_tool).collect())
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<String, EnsembleError> {
        let service = self.service()?;

        let arguments = if arguments.is_null() {
            None
        } else {
            arguments.as_object().cloned()
        };

        let request = CallToolRequestParam {
            name: tool_name.to_string().into(),
            arguments,
        };

        let result = service.call_tool(request).await.map_err(|e| {
            EnsembleError::MCPError(format!("Failed to call tool '{}': {}", tool_name, e))
        })?;

        if result.is_error == Some(true) {
            return Err(EnsembleError::MCPError(format!(
                "Tool '{}' reported an error: {}",
                tool_name,
                render_content(&result.content)
            )));
        }

        Ok(render_content(&result.content))
    }

    pub async fn disconnect(&mut self) -> Result<(), EnsembleError> {
        if let Some(service) = self.service.take() {
            service
                .cancel()
                .await
                .map_err(|e| EnsembleError::MCPError(format!("Failed to cancel service: {}", e)))?;
        }
        log::info!("Disconnected from MCP server '{}'", self.name);
        Ok(())
    }
}

impl Drop for RMCPClient {
    fn drop(&mut self) {
        if let Some(service) = self.service.take() {
            // Can't await in Drop
            tokio::spawn(async move {
                if let Err(e) = service.cancel().await {
                    log::warn!("Failed to cancel service during drop: {}", e);
                }
            });
        }
    }
}

fn convert_tool(tool: &Tool) -> ExternalToolInfo {
    ExternalToolInfo {
        name: tool.name.to_string(),
        description: tool
            .description
            .as_ref()
            .map(|d| d.as_ref())
            .unwrap_or("")
            .to_string(),
        input_schema: Value::Object(tool.input_schema.as_ref().clone()),
    }
}

fn render_content(content: &[rmcp::model::Content]) -> String {
    if content.is_empty() {
        return "Tool executed successfully (no content returned)".to_string();
    }

    let mut text = String::new();
    for c in content {
        let part = match &c.raw {
            RawContent::Text(text_content) => text_content.text.clone(),
            RawContent::Image(image) => {
                format!("Image ({}, {} bytes)", image.mime_type, image.data.len())
            }
            RawContent::Resource(resource) => match &resource.resource {
                ResourceContents::TextResourceContents { uri, .. }
                | ResourceContents::BlobResourceContents { uri, .. } => {
                    format!("Resource: {}", uri)
                }
            },
            RawContent::Audio(audio) => {
                format!("Audio ({}, {} bytes)", audio.mime_type, audio.data.len())
            }
        };
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&part);
    }

    truncate_chars(text, RESPONSE_CHAR_LIMIT)
}

fn truncate_chars(text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text;
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push_str(TRUNCATION_MESSAGE);
    truncated
}

/// Connected MCP servers keyed by server name.
#[derive(Default)]
pub struct McpToolServers {
    clients: HashMap<String, RMCPClient>,
}

impl McpToolServers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every enabled server. A server that fails to start is logged and skipped.
    pub async fn connect_all<'a, I>(servers: I) -> Self
    where
        I: IntoIterator<Item = &'a McpServerConfig>,
    {
        let mut group = Self::new();
        for server in servers.into_iter().filter(|s| s.enabled) {
            match RMCPClient::connect(&server.name, &server.command).await {
                Ok(client) => {
                    group.clients.insert(server.name.clone(), client);
                }
                Err(e) => log::error!("Skipping MCP server '{}': {}", server.name, e),
            }
        }
        group
    }

    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub async fn shutdown(&mut self) {
        for (name, mut client) in self.clients.drain() {
            if let Err(e) = client.disconnect().await {
                log::warn!("Error disconnecting MCP server '{}': {}", name, e);
            }
        }
    }
}

#[async_trait]
impl ExternalTools for McpToolServers {
    async fn list_tools(&self) -> Result<HashMap<String, Vec<ExternalToolInfo>>, EnsembleError> {
        let mut all = HashMap::new();
        for (name, client) in &self.clients {
            match client.list_tools().await {
                Ok(tools) => {
                    all.insert(name.clone(), tools);
                }
                Err(e) => log::error!("Error listing tools from MCP server '{}': {}", name, e),
            }
        }
        Ok(all)
    }

    async fn call_tool(
        &self,
        source: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, EnsembleError> {
        let client = self.clients.get(source).ok_or_else(|| {
            EnsembleError::MCPError(format!("Unknown MCP server '{}'", source))
        })?;
        client.call_tool(tool, arguments).await.map(Value::String)
    }
}
