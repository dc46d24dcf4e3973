//! Persistence contract for long-term memory and task history.
//!
//! `InMemoryStore` backs tests and ephemeral runs, while
//! [`SqliteStore`](super::sqlite::SqliteStore) keeps records across restarts.
//! Both return search results ordered by importance, then timestamp, newest
//! first, and bump the access counters of every returned record.

use crate::errors::EnsembleError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LongTermRecord {
    pub id: i64,
    pub agent_id: String,
    pub memory_type: String,
    pub content: String,
    pub metadata: Value,
    pub importance: f64,
    pub timestamp: DateTime<Utc>,
    pub accessed_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewLongTermRecord {
    pub agent_id: String,
    pub memory_type: String,
    pub content: String,
    pub metadata: Value,
    pub importance: f64,
}

#[derive(Debug, Clone)]
pub struct LongTermQuery {
    pub agent_id: String,
    pub memory_type: Option<String>,
    pub limit: usize,
    pub min_importance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Started,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Started => "started",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, EnsembleError> {
        match value {
            "started" => Ok(TaskStatus::Started),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(EnsembleError::StorageError(format!(
                "Unknown task status '{}'",
                other
            ))),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub task_id: String,
    pub agent_id: String,
    pub description: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub metadata: Value,
}

/// Fields to change on an existing task. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub result: Option<String>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.result.is_none()
    }
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn insert_long_term(&self, record: NewLongTermRecord) -> Result<i64, EnsembleError>;

    async fn search_long_term(
        &self,
        query: &LongTermQuery,
    ) -> Result<Vec<LongTermRecord>, EnsembleError>;

    /// Fails with `ValidationError` when the task id already exists for the agent.
    async fn insert_task(&self, record: TaskRecord) -> Result<(), EnsembleError>;

    /// Returns `false` when no task matched.
    async fn update_task(
        &self,
        agent_id: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<bool, EnsembleError>;

    async fn get_task(
        &self,
        agent_id: &str,
        task_id: &str,
    ) -> Result<Option<TaskRecord>, EnsembleError>;

    /// Newest first.
    async fn task_history(
        &self,
        agent_id: &str,
        limit: usize,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskRecord>, EnsembleError>;
}

#[derive(Default)]
struct InMemoryState {
    next_id: i64,
    long_term: Vec<LongTermRecord>,
    tasks: Vec<TaskRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<InMemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn insert_long_term(&self, record: NewLongTermRecord) -> Result<i64, EnsembleError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;
        state.long_term.push(LongTermRecord {
            id,
            agent_id: record.agent_id,
            memory_type: record.memory_type,
            content: record.content,
            metadata: record.metadata,
            importance: record.importance,
            timestamp: Utc::now(),
            accessed_count: 0,
            last_accessed: None,
        });
        Ok(id)
    }

    async fn search_long_term(
        &self,
        query: &LongTermQuery,
    ) -> Result<Vec<LongTermRecord>, EnsembleError> {
        let mut state = self.state.write().await;

        let mut matches: Vec<LongTermRecord> = state
            .long_term
            .iter()
            .filter(|r| r.agent_id == query.agent_id)
            .filter(|r| r.importance >= query.min_importance)
            .filter(|r| {
                query
                    .memory_type
                    .as_deref()
                    .map_or(true, |t| r.memory_type == t)
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then(b.timestamp.cmp(&a.timestamp))
                .then(b.id.cmp(&a.id))
        });
        matches.truncate(query.limit);

        let now = Utc::now();
        for record in state
            .long_term
            .iter_mut()
            .filter(|r| matches.iter().any(|m| m.id == r.id))
        {
            record.accessed_count += 1;
            record.last_accessed = Some(now);
        }

        Ok(matches)
    }

    async fn insert_task(&self, record: TaskRecord) -> Result<(), EnsembleError> {
        let mut state = self.state.write().await;
        if state
            .tasks
            .iter()
            .any(|t| t.agent_id == record.agent_id && t.task_id == record.task_id)
        {
            return Err(EnsembleError::ValidationError(format!(
                "Task '{}' already exists",
                record.task_id
            )));
        }
        state.tasks.push(record);
        Ok(())
    }

    async fn update_task(
        &self,
        agent_id: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<bool, EnsembleError> {
        let mut state = self.state.write().await;
        let Some(task) = state
            .tasks
            .iter_mut()
            .find(|t| t.agent_id == agent_id && t.task_id == task_id)
        else {
            return Ok(false);
        };

        if let Some(status) = update.status {
            task.status = status;
            if status.is_terminal() {
                task.completed_at = Some(Utc::now());
            }
        }
        if let Some(result) = &update.result {
            task.result = Some(result.clone());
        }
        Ok(true)
    }

    async fn get_task(
        &self,
        agent_id: &str,
        task_id: &str,
    ) -> Result<Option<TaskRecord>, EnsembleError> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .iter()
            .find(|t| t.agent_id == agent_id && t.task_id == task_id)
            .cloned())
    }

    async fn task_history(
        &self,
        agent_id: &str,
        limit: usize,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskRecord>, EnsembleError> {
        let state = self.state.read().await;
        let mut tasks: Vec<TaskRecord> = state
            .tasks
            .iter()
            .rev()
            .filter(|t| t.agent_id == agent_id)
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        // Stable sort keeps reverse insertion order for equal start times.
        tasks.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        tasks.truncate(limit);
        Ok(tasks)
    }
}
