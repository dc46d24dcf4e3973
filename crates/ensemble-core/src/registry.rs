//! Explicitly constructed registry of live agents.
//!
//! Each agent sits behind its own `tokio::sync::Mutex`. A collaboration holds
//! the locks of all its participants until it finishes, so collaborations
//! that share an agent run one after the other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::agent::Agent;
use crate::config::AgentDefinition;
use crate::errors::EnsembleError;

#[derive(Clone)]
pub struct AgentHandle {
    pub id: String,
    pub profile: AgentDefinition,
    pub agent: Arc<Mutex<Agent>>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("id", &self.id)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl AgentHandle {
    pub fn name(&self) -> &str {
        &self.profile.name
    }
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentHandle>>,
    order: RwLock<Vec<String>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, agent: Agent) -> Result<AgentHandle, EnsembleError> {
        let id = agent.id().to_string();
        let mut agents = self.agents.write().await;
        if agents.contains_key(&id) {
            return Err(EnsembleError::ValidationError(format!(
                "Agent '{}' is already registered",
                id
            )));
        }

        let handle = AgentHandle {
            id: id.clone(),
            profile: agent.profile().clone(),
            agent: Arc::new(Mutex::new(agent)),
        };
        agents.insert(id.clone(), handle.clone());
        self.order.write().await.push(id.clone());
        log::info!("Registered agent '{}' ({})", handle.name(), id);
        Ok(handle)
    }

    pub async fn get(&self, id: &str) -> Option<AgentHandle> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<AgentHandle> {
        self.agents
            .read()
            .await
            .values()
            .find(|handle| handle.name() == name)
            .cloned()
    }

    /// Handles in registration order.
    pub async fn list(&self) -> Vec<AgentHandle> {
        let agents = self.agents.read().await;
        self.order
            .read()
            .await
            .iter()
            .filter_map(|id| agents.get(id).cloned())
            .collect()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.order.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Removes the agent and cleans it up. Returns whether it was registered.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.agents.write().await.remove(id);
        self.order.write().await.retain(|existing| existing != id);
        match removed {
            Some(handle) => {
                handle.agent.lock().await.cleanup();
                log::info!("Removed agent '{}' ({})", handle.name(), id);
                true
            }
            None => false,
        }
    }

    /// Cleans up and drops every agent.
    pub async fn shutdown(&self) {
        let handles: Vec<AgentHandle> = self.agents.write().await.drain().map(|(_, h)| h).collect();
        self.order.write().await.clear();
        for handle in handles {
            handle.agent.lock().await.cleanup();
        }
        log::info!("Agent registry shut down");
    }
}
