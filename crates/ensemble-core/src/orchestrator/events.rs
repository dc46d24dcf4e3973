//! Collaboration timeline entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventRole {
    System,
    Agent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    /// Round duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rounds: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollaborationEvent {
    pub role: EventRole,
    pub content: String,
    pub metadata: EventMetadata,
    pub timestamp: DateTime<Utc>,
}

impl CollaborationEvent {
    fn new(role: EventRole, content: String, metadata: EventMetadata) -> Self {
        Self {
            role,
            content,
            metadata,
            timestamp: Utc::now(),
        }
    }

    pub fn started(task: &str) -> Self {
        Self::new(
            EventRole::System,
            format!("Starting collaboration on task: {}", task),
            EventMetadata::default(),
        )
    }

    pub fn agent_response(agent_id: &str, agent_name: &str, round: usize, text: &str) -> Self {
        Self::new(
            EventRole::Agent,
            format!("[{}]: {}", agent_name, text),
            EventMetadata {
                agent_id: Some(agent_id.to_string()),
                agent_name: Some(agent_name.to_string()),
                round: Some(round),
                completed: Some(true),
                ..Default::default()
            },
        )
    }

    pub fn agent_error(agent_id: &str, agent_name: &str, round: usize, error: &str) -> Self {
        Self::new(
            EventRole::Agent,
            format!("[{}]: Error - {}", agent_name, error),
            EventMetadata {
                agent_id: Some(agent_id.to_string()),
                agent_name: Some(agent_name.to_string()),
                round: Some(round),
                completed: Some(false),
                error: Some(true),
                ..Default::default()
            },
        )
    }

    pub fn round_completed(round: usize, duration: f64, all_completed: bool) -> Self {
        Self::new(
            EventRole::System,
            format!("Round {} completed", round),
            EventMetadata {
                round: Some(round),
                duration: Some(duration),
                all_completed: Some(all_completed),
                ..Default::default()
            },
        )
    }

    pub fn finished(total_rounds: usize) -> Self {
        Self::new(
            EventRole::System,
            format!("Collaboration completed after {} rounds", total_rounds),
            EventMetadata {
                total_rounds: Some(total_rounds),
                ..Default::default()
            },
        )
    }

    pub fn is_error(&self) -> bool {
        self.metadata.error == Some(true)
    }

    pub fn is_round_summary(&self) -> bool {
        self.role == EventRole::System && self.metadata.all_completed.is_some()
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.metadata.agent_id.as_deref()
    }
}
