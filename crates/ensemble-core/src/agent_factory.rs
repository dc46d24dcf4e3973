//! Agent factory for building a configured ensemble from `EnsembleConfig`

use std::sync::Arc;

use uuid::Uuid;

use crate::agent::Agent;
use crate::config::{AgentDefinition, EnsembleConfig};
use crate::errors::EnsembleError;
use crate::llm::{HttpLLMClient, LLM};
use crate::memory::{InMemoryStore, MemoryStore, SqliteStore, TieredMemory};
use crate::orchestrator::CollaborationOrchestrator;
use crate::registry::AgentRegistry;
use crate::tools::{ExternalTools, McpToolServers, ToolRegistry};

/// Everything built from one configuration: the agents, their shared store,
/// the MCP servers they call, and an orchestrator over them.
pub struct Ensemble {
    pub registry: Arc<AgentRegistry>,
    pub orchestrator: CollaborationOrchestrator,
    store: Arc<dyn MemoryStore>,
    mcp_servers: Option<Arc<McpToolServers>>,
}

impl Ensemble {
    pub fn store(&self) -> Arc<dyn MemoryStore> {
        self.store.clone()
    }

    /// Clean up every agent, then stop MCP servers no agent still holds.
    pub async fn shutdown(self) {
        let Ensemble {
            registry,
            orchestrator,
            mcp_servers,
            ..
        } = self;
        registry.shutdown().await;
        drop(orchestrator);
        drop(registry);

        if let Some(servers) = mcp_servers {
            match Arc::try_unwrap(servers) {
                Ok(mut servers) => servers.shutdown().await,
                Err(_) => log::debug!("MCP servers still referenced; they stop when dropped"),
            }
        }
    }
}

pub struct AgentFactory;

impl AgentFactory {
    pub async fn create_from_config(config: &EnsembleConfig) -> Result<Ensemble, EnsembleError> {
        let llm: Arc<dyn LLM> = Arc::new(HttpLLMClient::from_config(&config.llm));
        Self::create_with_llm(config, llm).await
    }

    /// Build the ensemble around a caller-supplied model, shared by every agent.
    pub async fn create_with_llm(
        config: &EnsembleConfig,
        llm: Arc<dyn LLM>,
    ) -> Result<Ensemble, EnsembleError> {
        config.validate()?;

        let store = Self::configure_store(config).await?;
        let mcp_servers = Self::configure_mcp_servers(config).await;

        let registry = Arc::new(AgentRegistry::new());
        for definition in &config.agents {
            let agent = Self::build_agent(
                config,
                definition,
                llm.clone(),
                store.clone(),
                mcp_servers.clone(),
            )
            .await;
            registry.register(agent).await?;
        }

        let orchestrator =
            CollaborationOrchestrator::new(registry.clone(), config.collaboration.clone());
        log::info!("Built ensemble with {} agents", config.agents.len());

        Ok(Ensemble {
            registry,
            orchestrator,
            store,
            mcp_servers,
        })
    }

    async fn configure_store(
        config: &EnsembleConfig,
    ) -> Result<Arc<dyn MemoryStore>, EnsembleError> {
        match &config.memory.database {
            Some(path) => {
                log::info!("Using SQLite memory store at {}", path.display());
                Ok(Arc::new(SqliteStore::open(path).await?))
            }
            None => {
                log::info!("Using in-memory store; long-term memory will not persist");
                Ok(Arc::new(InMemoryStore::new()))
            }
        }
    }

    async fn configure_mcp_servers(config: &EnsembleConfig) -> Option<Arc<McpToolServers>> {
        let servers = McpToolServers::connect_all(config.enabled_mcp_servers()).await;
        if servers.is_empty() {
            if config.enabled_mcp_servers().next().is_some() {
                log::warn!("No configured MCP server could be started");
            }
            return None;
        }
        log::info!("Connected MCP servers: {:?}", servers.server_names());
        Some(Arc::new(servers))
    }

    async fn build_agent(
        config: &EnsembleConfig,
        definition: &AgentDefinition,
        llm: Arc<dyn LLM>,
        store: Arc<dyn MemoryStore>,
        mcp_servers: Option<Arc<McpToolServers>>,
    ) -> Agent {
        let id = Uuid::new_v4().to_string();
        let memory = TieredMemory::new(id.clone(), config.memory.short_term_capacity, store);

        let mut tools = ToolRegistry::new(&config.tools);
        if let Some(servers) = mcp_servers {
            let external: Arc<dyn ExternalTools> = servers;
            let discovered = tools.discover(external).await;
            log::debug!(
                "Agent '{}' has {} tools after discovery",
                definition.name,
                discovered.len()
            );
        }

        Agent::new(id, definition.clone(), llm)
            .with_memory(memory)
            .with_tools(tools)
            .with_context_messages(config.memory.context_messages)
    }
}
