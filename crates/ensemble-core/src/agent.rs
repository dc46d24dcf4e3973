//! A collaborating agent and the single-turn contract the orchestrator drives.
//!
//! An [`Agent`] binds a profile and a language model to its own tiered memory,
//! cognitive processor and tool registry. Each turn runs the cognitive pipeline
//! over the prompt, records a task, asks the model for a reply (offering tools
//! only when the pipeline decided on tool use), and feeds the outcome back into
//! memory and the processor.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cognitive::{CognitiveProcessor, Complexity, Decision, DecisionType, PlanStatus};
use crate::config::AgentDefinition;
use crate::core_types::{Message, Role};
use crate::errors::EnsembleError;
use crate::llm::{ToolMetadata, LLM};
use crate::memory::{ShortTermItem, TaskStatus, TieredMemory};
use crate::tools::ToolRegistry;

/// Environment context key under which the orchestrator publishes collaboration details.
pub const COLLABORATION_CONTEXT_KEY: &str = "collaboration";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Offline,
}

/// One LLM-backed exchange. Failures surface as `Err` and are handled by the caller.
#[async_trait]
pub trait AgentTurn: Send {
    async fn take_turn(
        &mut self,
        prompt: &str,
        history: &[Message],
    ) -> Result<String, EnsembleError>;
}

pub struct Agent {
    id: String,
    profile: AgentDefinition,
    llm: Arc<dyn LLM>,
    memory: TieredMemory,
    cognitive: CognitiveProcessor,
    tools: ToolRegistry,
    status: AgentStatus,
    context_messages: usize,
}

#[async_trait]
impl AgentTurn for Agent {
    async fn take_turn(
        &mut self,
        prompt: &str,
        history: &[Message],
    ) -> Result<String, EnsembleError> {
        self.status = AgentStatus::Busy;
        match self.process(prompt, history).await {
            Ok(response) => {
                self.status = AgentStatus::Idle;
                Ok(response)
            }
            Err(e) => {
                log::error!("Agent '{}' turn failed: {}", self.profile.name, e);
                self.status = AgentStatus::Error;
                Err(e)
            }
        }
    }
}

impl Agent {
    /// Agent with ephemeral memory and the default tool registry.
    pub fn new(id: impl Into<String>, profile: AgentDefinition, llm: Arc<dyn LLM>) -> Self {
        let id = id.into();
        Self {
            memory: TieredMemory::in_memory(id.clone()),
            cognitive: CognitiveProcessor::new(id.clone(), profile.name.clone()),
            tools: ToolRegistry::default(),
            status: AgentStatus::Idle,
            context_messages: 10,
            id,
            profile,
            llm,
        }
    }

    pub fn with_memory(mut self, memory: TieredMemory) -> Self {
        if memory.agent_id() != self.id {
            log::warn!(
                "Memory for '{}' is scoped to agent id '{}'",
                self.id,
                memory.agent_id()
            );
        }
        self.memory = memory;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_context_messages(mut self, context_messages: usize) -> Self {
        self.context_messages = context_messages;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &AgentDefinition {
        &self.profile
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn memory(&self) -> &TieredMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut TieredMemory {
        &mut self.memory
    }

    pub fn cognitive(&self) -> &CognitiveProcessor {
        &self.cognitive
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    /// Clears working memory and takes the agent offline.
    pub fn cleanup(&mut self) {
        self.memory.cleanup();
        self.status = AgentStatus::Offline;
        log::info!("Agent '{}' cleaned up", self.profile.name);
    }

    async fn process(
        &mut self,
        prompt: &str,
        history: &[Message],
    ) -> Result<String, EnsembleError> {
        self.memory
            .add_to_short_term(ShortTermItem::new(Role::User, prompt));

        let context = self.memory.get_short_term(None);
        let tool_names = self.tools.tool_names();
        let collaboration = self
            .memory
            .get_environment_context()
            .get(COLLABORATION_CONTEXT_KEY)
            .cloned();

        let perception =
            self.cognitive
                .perceive(prompt, &context, &tool_names, collaboration.as_ref());
        let reasoning = self
            .cognitive
            .reason(&perception, prompt, &self.profile.constraints);
        let decision = self.cognitive.decide(&reasoning, &perception);
        let plan = self.cognitive.plan_execution(&decision, prompt);
        let task_id = plan.task_id.clone();

        self.memory
            .save_task(&task_id, prompt, TaskStatus::Started)
            .await?;
        self.memory
            .update_working_memory("current_task", Value::String(prompt.to_string()));
        self.memory.update_working_memory(
            "decision",
            Value::String(decision.decision_type.as_str().to_string()),
        );

        let metadata = json!({
            "task_id": task_id,
            "prompt": prompt,
            "decision_type": decision.decision_type.as_str(),
        });
        let outcome = match self.respond(prompt, history, &decision).await {
            Ok(response) => {
                let importance = importance_for(perception.complexity);
                self.record_result(&task_id, response, metadata, importance)
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(response) => {
                self.cognitive.process_feedback(&response, None, true);
                self.cognitive.update_plan_status(
                    plan.steps.len(),
                    PlanStatus::Completed,
                    Some(response.clone()),
                );
                Ok(response)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(store_err) = self
                    .memory
                    .update_task(&task_id, Some(TaskStatus::Failed), Some(message.clone()))
                    .await
                {
                    log::warn!("Failed to record task failure for {}: {}", task_id, store_err);
                }
                self.cognitive.process_feedback(&message, None, false);
                Err(e)
            }
        }
    }

    /// Store a reply in short-term and long-term memory and complete its task.
    async fn record_result(
        &mut self,
        task_id: &str,
        response: String,
        metadata: Value,
        importance: f64,
    ) -> Result<String, EnsembleError> {
        self.memory.add_to_short_term(
            ShortTermItem::new(Role::Assistant, response.clone()).with_task(task_id),
        );
        self.memory
            .add_to_long_term("task_result", &response, metadata, importance)
            .await?;
        self.memory
            .update_task(task_id, Some(TaskStatus::Completed), Some(response.clone()))
            .await?;
        Ok(response)
    }

    async fn respond(
        &mut self,
        prompt: &str,
        history: &[Message],
        decision: &Decision,
    ) -> Result<String, EnsembleError> {
        let mut messages = Vec::with_capacity(history.len() + 2);

        let context = self.memory.get_context_for_llm(self.context_messages);
        let system_prompt = if context.is_empty() {
            self.profile.system_prompt.clone()
        } else {
            format!("{}\n\n{}", self.profile.system_prompt, context)
        };
        if !system_prompt.trim().is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.extend_from_slice(history);
        messages.push(Message::user(prompt));

        let tools: Option<Vec<ToolMetadata>> = (decision.decision_type == DecisionType::ToolUse)
            .then(|| self.tools.tool_metadata())
            .filter(|tools| !tools.is_empty());

        log::debug!(
            "Agent '{}' generating with {} messages and {} tools",
            self.profile.name,
            messages.len(),
            tools.as_ref().map_or(0, Vec::len)
        );
        let response = self.llm.generate(messages.clone(), tools).await?;

        let Some(tool_calls) = response.tool_calls.clone().filter(|calls| !calls.is_empty()) else {
            return non_empty_content(response.content);
        };

        messages.push(Message {
            role: Role::Assistant,
            content: response.content.unwrap_or_default(),
            tool_call_id: None,
            tool_calls: Some(tool_calls.clone()),
        });

        for call in tool_calls {
            log::info!("Agent '{}' calling tool {}", self.profile.name, call.name);
            let outcome = self.tools.execute(&call.name, call.arguments.clone(), true).await;
            let observation = match (outcome.success, outcome.result, outcome.error) {
                (true, Some(Value::String(text)), _) => text,
                (true, Some(value), _) => value.to_string(),
                (_, _, Some(error)) => format!("Error: {}", error),
                _ => "Tool returned no result".to_string(),
            };
            messages.push(Message::tool_result(call.id.clone(), observation));
        }

        let follow_up = self.llm.generate(messages, None).await?;
        non_empty_content(follow_up.content)
    }
}

fn non_empty_content(content: Option<String>) -> Result<String, EnsembleError> {
    content
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| EnsembleError::LLMError("LLM returned an empty response".to_string()))
}

fn importance_for(complexity: Complexity) -> f64 {
    match complexity {
        Complexity::Low => 0.3,
        Complexity::Medium => 0.5,
        Complexity::High => 0.8,
    }
}
