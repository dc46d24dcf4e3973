//! Core runtime for teams of collaborating LLM agents.
//!
//! Agents take turns on a shared task under a coordinator. Each agent carries
//! its own memory, decision pipeline and tools:
//!
//! - **Orchestration**: fixed-round coordinator/worker collaboration, buffered or streamed
//! - **Cognition**: rule-based perceive, reason, decide and plan stages with feedback
//! - **Memory**: short-term buffer, working memory, environment context, and a
//!   long-term store that can be backed by SQLite
//! - **Tools**: built-in and MCP-discovered tools behind a result cache and execution tracker
//! - **Configuration**: YAML ensemble definitions with validated defaults

pub mod agent;
pub mod agent_factory;
pub mod cognitive;
pub mod config;
pub mod core_types;
pub mod errors;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod registry;
pub mod tools;

pub use agent::{Agent, AgentStatus, AgentTurn};
pub use agent_factory::{AgentFactory, Ensemble};
pub use cognitive::CognitiveProcessor;
pub use config::*;
pub use errors::EnsembleError;
pub use llm::LLM;
pub use memory::TieredMemory;
pub use orchestrator::{
    CollaborationEvent, CollaborationOrchestrator, CollaborationRequest, CollaborationStream,
};
pub use registry::{AgentHandle, AgentRegistry};
pub use tools::ToolRegistry;
