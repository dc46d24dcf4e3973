//! Multi-round coordinator/worker collaboration.
//!
//! A collaboration is validated against the agent registry, locks every
//! participant for its whole run, publishes a collaboration context into each
//! participant's environment, and then runs exactly `max_rounds` rounds.
//! Within a round agents take turns one after the other in participant order,
//! because each prompt is built from the outputs before it. A failed turn becomes an error event and the round moves on.
//! Round summaries close every round, and a final event closes the run.
//!
//! [`CollaborationOrchestrator::collaborate`] returns the whole timeline once
//! it is done. [`CollaborationOrchestrator::collaborate_stream`] runs the same
//! protocol in a background task and yields events as they are produced.

pub mod events;
pub mod prompts;
pub mod stream;

pub use events::{CollaborationEvent, EventMetadata, EventRole};
pub use prompts::TurnOutput;
pub use stream::{CollaborationStream, StreamMessage};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentTurn, COLLABORATION_CONTEXT_KEY};
use crate::config::CollaborationConfig;
use crate::core_types::Message;
use crate::errors::EnsembleError;
use crate::registry::{AgentHandle, AgentRegistry};
use stream::{ChannelSink, Discard, EventSink};

const IN_COLLABORATION_KEY: &str = "in_collaboration";
const COLLABORATION_MEMORY_IMPORTANCE: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct CollaborationRequest {
    pub agent_ids: Vec<String>,
    pub task: String,
    pub coordinator_id: Option<String>,
    /// Falls back to the orchestrator's configured round count.
    pub max_rounds: Option<usize>,
}

impl CollaborationRequest {
    pub fn new(agent_ids: Vec<String>, task: impl Into<String>) -> Self {
        Self {
            agent_ids,
            task: task.into(),
            coordinator_id: None,
            max_rounds: None,
        }
    }

    pub fn with_coordinator(mut self, coordinator_id: impl Into<String>) -> Self {
        self.coordinator_id = Some(coordinator_id.into());
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }
}

pub struct CollaborationOrchestrator {
    registry: Arc<AgentRegistry>,
    config: CollaborationConfig,
}

impl CollaborationOrchestrator {
    pub fn new(registry: Arc<AgentRegistry>, config: CollaborationConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Run the collaboration to completion and return its timeline.
    pub async fn collaborate(
        &self,
        request: CollaborationRequest,
    ) -> Result<Vec<CollaborationEvent>, EnsembleError> {
        let mut session = self.prepare(request).await?;
        session.run(&mut Discard).await?;
        Ok(session.into_events())
    }

    /// Validate eagerly, then run the collaboration in a background task.
    ///
    /// Dropping the returned stream cancels the background task.
    pub async fn collaborate_stream(
        &self,
        request: CollaborationRequest,
    ) -> Result<CollaborationStream, EnsembleError> {
        let mut session = self.prepare(request).await?;

        let (sender, receiver) = mpsc::channel(self.config.stream_buffer.max(1));
        let token = CancellationToken::new();
        let producer_token = token.clone();

        tokio::spawn(async move {
            let mut sink = ChannelSink::new(sender, producer_token.clone());
            let outcome = tokio::select! {
                _ = producer_token.cancelled() => {
                    Err(EnsembleError::Cancelled("collaboration stream was dropped".to_string()))
                }
                outcome = session.run(&mut sink) => outcome,
            };

            match outcome {
                Err(EnsembleError::Cancelled(reason)) => {
                    log::info!("Collaboration cancelled: {}", reason);
                    session.release();
                }
                other => sink.finish(other).await,
            }
        });

        Ok(CollaborationStream::new(receiver, token))
    }

    async fn prepare(&self, request: CollaborationRequest) -> Result<Session, EnsembleError> {
        let (participants, coordinator_id) = self.resolve_participants(&request).await?;
        let max_rounds = request.max_rounds.unwrap_or(self.config.max_rounds);
        if max_rounds == 0 {
            return Err(EnsembleError::Precondition(
                "max_rounds must be at least 1".to_string(),
            ));
        }

        Ok(Session {
            task: request.task,
            participants,
            coordinator_id,
            agents: Vec::new(),
            max_rounds,
            history_window: self.config.history_window,
            events: Vec::new(),
            outputs: Vec::new(),
            initialized: false,
        })
    }

    /// Participants in the given order, plus the coordinator id. A coordinator
    /// outside the list must exist but takes no turns.
    async fn resolve_participants(
        &self,
        request: &CollaborationRequest,
    ) -> Result<(Vec<Participant>, String), EnsembleError> {
        if request.agent_ids.is_empty() {
            return Err(EnsembleError::Precondition(
                "No agents specified for collaboration".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut handles = Vec::with_capacity(request.agent_ids.len());
        for id in &request.agent_ids {
            if !seen.insert(id.clone()) {
                return Err(EnsembleError::Precondition(format!(
                    "Agent {} listed more than once",
                    id
                )));
            }
            let handle = self
                .registry
                .get(id)
                .await
                .ok_or_else(|| EnsembleError::Precondition(format!("Agent {} not found", id)))?;
            handles.push(handle);
        }

        let coordinator_id = match &request.coordinator_id {
            Some(id) => {
                if !seen.contains(id) && self.registry.get(id).await.is_none() {
                    return Err(EnsembleError::Precondition(format!(
                        "Coordinator agent {} not found",
                        id
                    )));
                }
                id.clone()
            }
            None => request.agent_ids[0].clone(),
        };

        let participants = handles
            .into_iter()
            .map(|handle| Participant {
                is_coordinator: handle.id == coordinator_id,
                handle,
            })
            .collect();
        Ok((participants, coordinator_id))
    }
}

struct Participant {
    handle: AgentHandle,
    is_coordinator: bool,
}

impl Participant {
    fn id(&self) -> &str {
        &self.handle.id
    }

    fn name(&self) -> &str {
        self.handle.name()
    }
}

/// State for one collaboration run.
struct Session {
    task: String,
    participants: Vec<Participant>,
    coordinator_id: String,
    /// Held for the whole run, index-aligned with `participants`.
    agents: Vec<OwnedMutexGuard<Agent>>,
    max_rounds: usize,
    history_window: usize,
    events: Vec<CollaborationEvent>,
    outputs: Vec<TurnOutput>,
    initialized: bool,
}

impl Session {
    async fn run<S: EventSink>(&mut self, sink: &mut S) -> Result<(), EnsembleError> {
        log::info!(
            "Starting collaboration with {} agents for {} rounds",
            self.participants.len(),
            self.max_rounds
        );
        self.initialize(sink).await?;

        for round in 1..=self.max_rounds {
            let started = Instant::now();
            let mut completed: HashMap<String, bool> = HashMap::new();

            for index in 0..self.participants.len() {
                let success = self.take_turn(index, round, sink).await?;
                completed.insert(self.participants[index].id().to_string(), success);
            }

            let all_completed = completed.values().all(|done| *done);
            let duration = started.elapsed().as_secs_f64();
            log::info!(
                "Round {} completed in {:.2}s (all completed: {})",
                round,
                duration,
                all_completed
            );
            self.record(CollaborationEvent::round_completed(round, duration, all_completed), sink)
                .await?;
        }

        self.finalize(sink).await
    }

    async fn initialize<S: EventSink>(&mut self, sink: &mut S) -> Result<(), EnsembleError> {
        self.acquire().await;
        self.record(CollaborationEvent::started(&self.task), sink).await?;

        let agent_ids: Vec<&str> = self.participants.iter().map(Participant::id).collect();
        let mut context = Map::new();
        context.insert(IN_COLLABORATION_KEY.to_string(), Value::Bool(true));
        context.insert(
            COLLABORATION_CONTEXT_KEY.to_string(),
            json!({
                "total_agents": self.participants.len(),
                "agent_ids": agent_ids,
                "coordinator_id": self.coordinator_id,
                "task": self.task,
            }),
        );

        self.initialized = true;
        for agent in self.agents.iter_mut() {
            agent.memory_mut().update_environment_context(context.clone());
        }
        Ok(())
    }

    /// Lock every participant in id order so overlapping sessions cannot deadlock.
    async fn acquire(&mut self) {
        let mut order: Vec<usize> = (0..self.participants.len()).collect();
        order.sort_by(|&a, &b| self.participants[a].id().cmp(self.participants[b].id()));

        let mut slots: Vec<Option<OwnedMutexGuard<Agent>>> =
            self.participants.iter().map(|_| None).collect();
        for index in order {
            let agent = Arc::clone(&self.participants[index].handle.agent);
            slots[index] = Some(agent.lock_owned().await);
        }
        self.agents = slots.into_iter().flatten().collect();
    }

    /// Returns whether the agent completed its turn. Only sink failures are errors.
    async fn take_turn<S: EventSink>(
        &mut self,
        index: usize,
        round: usize,
        sink: &mut S,
    ) -> Result<bool, EnsembleError> {
        let prompt = self.build_prompt(index, round);
        let history = self.history_for(self.participants[index].id());
        let participant = &self.participants[index];
        let agent_id = participant.id().to_string();
        let agent_name = participant.name().to_string();

        log::debug!("Round {}: dispatching to {}", round, agent_name);
        let result = self.agents[index].take_turn(&prompt, &history).await;

        match result {
            Ok(text) => {
                self.outputs.push(TurnOutput {
                    agent_id: agent_id.clone(),
                    agent_name: agent_name.clone(),
                    round,
                    text: text.clone(),
                });
                self.record(
                    CollaborationEvent::agent_response(&agent_id, &agent_name, round, &text),
                    sink,
                )
                .await?;
                Ok(true)
            }
            Err(e) => {
                log::warn!("Agent '{}' failed in round {}: {}", agent_name, round, e);
                self.record(
                    CollaborationEvent::agent_error(&agent_id, &agent_name, round, &e.to_string()),
                    sink,
                )
                .await?;
                Ok(false)
            }
        }
    }

    fn build_prompt(&self, index: usize, round: usize) -> String {
        let participant = &self.participants[index];
        let profile = &participant.handle.profile;

        if participant.is_coordinator {
            if round == 1 {
                let workers: Vec<_> = self
                    .participants
                    .iter()
                    .filter(|p| !p.is_coordinator)
                    .map(|p| &p.handle.profile)
                    .collect();
                prompts::coordinator_assignment(&self.task, profile, &workers, self.max_rounds)
            } else {
                let previous: Vec<&TurnOutput> = self
                    .outputs
                    .iter()
                    .filter(|o| o.round == round - 1 && o.agent_id != participant.id())
                    .collect();
                prompts::coordinator_review(&self.task, round, self.max_rounds, &previous)
            }
        } else {
            let latest = self
                .outputs
                .iter()
                .rev()
                .find(|o| o.agent_id == self.coordinator_id);
            prompts::worker_turn(&self.task, profile, latest)
        }
    }

    /// Recent timeline as chat history from the point of view of `agent_id`.
    fn history_for(&self, agent_id: &str) -> Vec<Message> {
        let skip = self.events.len().saturating_sub(self.history_window);
        self.events[skip..]
            .iter()
            .map(|event| match (event.role, event.agent_id()) {
                (EventRole::System, _) => Message::system(event.content.clone()),
                (EventRole::Agent, Some(id)) if id == agent_id => {
                    Message::assistant(event.content.clone())
                }
                (EventRole::Agent, _) => Message::user(event.content.clone()),
            })
            .collect()
    }

    async fn finalize<S: EventSink>(&mut self, sink: &mut S) -> Result<(), EnsembleError> {
        self.release();

        let summary = json!({
            "task": self.task,
            "rounds": self.max_rounds,
            "agent_ids": self.participants.iter().map(Participant::id).collect::<Vec<_>>(),
            "turns": self.outputs.len(),
        });
        for (participant, agent) in self.participants.iter().zip(&self.agents) {
            let completed_turns = self
                .outputs
                .iter()
                .filter(|o| o.agent_id == participant.id())
                .count();
            let content = format!(
                "Collaboration on '{}': {} of {} turns completed",
                self.task, completed_turns, self.max_rounds
            );
            if let Err(e) = agent
                .memory()
                .add_to_long_term(
                    "collaboration",
                    &content,
                    summary.clone(),
                    COLLABORATION_MEMORY_IMPORTANCE,
                )
                .await
            {
                log::warn!(
                    "Failed to record collaboration memory for '{}': {}",
                    participant.name(),
                    e
                );
            }
        }

        self.record(CollaborationEvent::finished(self.max_rounds), sink)
            .await?;
        log::info!("Collaboration completed after {} rounds", self.max_rounds);
        Ok(())
    }

    /// Clear the collaboration context from every participant.
    fn release(&mut self) {
        if !self.initialized {
            return;
        }
        for agent in self.agents.iter_mut() {
            clear_collaboration_context(agent.memory_mut());
        }
        self.initialized = false;
    }

    async fn record<S: EventSink>(
        &mut self,
        event: CollaborationEvent,
        sink: &mut S,
    ) -> Result<(), EnsembleError> {
        sink.emit(&event).await?;
        self.events.push(event);
        Ok(())
    }

    fn into_events(self) -> Vec<CollaborationEvent> {
        self.events
    }
}

fn clear_collaboration_context(memory: &mut crate::memory::TieredMemory) {
    let mut partial = Map::new();
    partial.insert(IN_COLLABORATION_KEY.to_string(), Value::Bool(false));
    memory.update_environment_context(partial);
    memory.remove_environment_context(COLLABORATION_CONTEXT_KEY);
}
