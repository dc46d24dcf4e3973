//! Tiered per-agent memory.
//!
//! Each agent owns four tiers with different lifetimes:
//!
//! - **Short-term**: a ring buffer of the latest conversation items.
//! - **Working memory**: a scratchpad for the current task, cleared on cleanup.
//! - **Environment context**: facts about the agent's surroundings, merged
//!   incrementally (for example, the collaboration it is taking part in).
//! - **Long-term**: importance-ranked records and task history kept in a
//!   [`MemoryStore`], which may be durable.

pub mod short_term;
pub mod sqlite;
pub mod store;

pub use short_term::{ShortTermBuffer, ShortTermItem};
pub use sqlite::SqliteStore;
pub use store::{
    InMemoryStore, LongTermQuery, LongTermRecord, MemoryStore, NewLongTermRecord, TaskRecord,
    TaskStatus, TaskUpdate,
};

use crate::errors::EnsembleError;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const CONTEXT_CONTENT_LIMIT: usize = 200;

pub struct TieredMemory {
    agent_id: String,
    short_term: ShortTermBuffer,
    working: BTreeMap<String, Value>,
    environment: BTreeMap<String, Value>,
    store: Arc<dyn MemoryStore>,
}

impl TieredMemory {
    pub fn new(agent_id: impl Into<String>, capacity: usize, store: Arc<dyn MemoryStore>) -> Self {
        Self {
            agent_id: agent_id.into(),
            short_term: ShortTermBuffer::new(capacity),
            working: BTreeMap::new(),
            environment: BTreeMap::new(),
            store,
        }
    }

    /// Ephemeral memory with the default short-term capacity.
    pub fn in_memory(agent_id: impl Into<String>) -> Self {
        Self::new(agent_id, 20, Arc::new(InMemoryStore::new()))
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn add_to_short_term(&mut self, item: ShortTermItem) {
        self.short_term.push(item);
    }

    pub fn get_short_term(&self, limit: Option<usize>) -> Vec<ShortTermItem> {
        self.short_term.recent(limit)
    }

    pub fn short_term_len(&self) -> usize {
        self.short_term.len()
    }

    pub async fn add_to_long_term(
        &self,
        memory_type: &str,
        content: &str,
        metadata: Value,
        importance: f64,
    ) -> Result<i64, EnsembleError> {
        if !(0.0..=1.0).contains(&importance) {
            return Err(EnsembleError::ValidationError(format!(
                "Importance must be within [0, 1], got {}",
                importance
            )));
        }

        self.store
            .insert_long_term(NewLongTermRecord {
                agent_id: self.agent_id.clone(),
                memory_type: memory_type.to_string(),
                content: content.to_string(),
                metadata,
                importance,
            })
            .await
    }

    pub async fn search_long_term(
        &self,
        memory_type: Option<&str>,
        limit: usize,
        min_importance: f64,
    ) -> Result<Vec<LongTermRecord>, EnsembleError> {
        self.store
            .search_long_term(&LongTermQuery {
                agent_id: self.agent_id.clone(),
                memory_type: memory_type.map(str::to_string),
                limit,
                min_importance,
            })
            .await
    }

    pub fn update_working_memory(&mut self, key: impl Into<String>, value: Value) {
        self.working.insert(key.into(), value);
    }

    pub fn get_working_memory(&self, key: &str) -> Option<&Value> {
        self.working.get(key)
    }

    pub fn get_working_memory_all(&self) -> BTreeMap<String, Value> {
        self.working.clone()
    }

    pub fn clear_working_memory(&mut self) {
        self.working.clear();
    }

    /// Merges the given keys into the environment context, leaving other keys as they are.
    pub fn update_environment_context(&mut self, partial: Map<String, Value>) {
        self.environment.extend(partial);
    }

    pub fn remove_environment_context(&mut self, key: &str) -> Option<Value> {
        self.environment.remove(key)
    }

    pub fn get_environment_context(&self) -> BTreeMap<String, Value> {
        self.environment.clone()
    }

    pub async fn save_task(
        &self,
        task_id: &str,
        description: &str,
        status: TaskStatus,
    ) -> Result<(), EnsembleError> {
        let now = Utc::now();
        self.store
            .insert_task(TaskRecord {
                task_id: task_id.to_string(),
                agent_id: self.agent_id.clone(),
                description: description.to_string(),
                status,
                started_at: now,
                completed_at: status.is_terminal().then_some(now),
                result: None,
                metadata: Value::Object(Map::new()),
            })
            .await
    }

    /// Returns `Ok(false)` without touching the store when there is nothing to change.
    pub async fn update_task(
        &self,
        task_id: &str,
        status: Option<TaskStatus>,
        result: Option<String>,
    ) -> Result<bool, EnsembleError> {
        let update = TaskUpdate { status, result };
        if update.is_empty() {
            return Ok(false);
        }
        self.store.update_task(&self.agent_id, task_id, &update).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>, EnsembleError> {
        self.store.get_task(&self.agent_id, task_id).await
    }

    pub async fn get_task_history(
        &self,
        limit: usize,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskRecord>, EnsembleError> {
        self.store.task_history(&self.agent_id, limit, status).await
    }

    /// Render environment, working memory and recent conversation as prompt context.
    pub fn get_context_for_llm(&self, max_messages: usize) -> String {
        let mut parts: Vec<String> = Vec::new();

        if !self.environment.is_empty() {
            parts.push("Environment Context:".to_string());
            for (key, value) in &self.environment {
                parts.push(format!("  {}: {}", key, display_value(value)));
            }
        }

        if !self.working.is_empty() {
            parts.push("\nCurrent Task Context:".to_string());
            for (key, value) in &self.working {
                parts.push(format!("  {}: {}", key, display_value(value)));
            }
        }

        let recent = self.short_term.recent(Some(max_messages));
        if !recent.is_empty() {
            parts.push("\nRecent Conversation:".to_string());
            for item in recent {
                let content: String = item.content.chars().take(CONTEXT_CONTENT_LIMIT).collect();
                parts.push(format!("  {}: {}", item.role.as_str(), content));
            }
        }

        parts.join("\n")
    }

    pub fn cleanup(&mut self) {
        self.clear_working_memory();
        log::debug!("Cleaned up memory for agent {}", self.agent_id);
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Role;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_context_empty_when_nothing_stored() {
        let memory = TieredMemory::in_memory("a");
        assert_eq!(memory.get_context_for_llm(10), "");
    }

    #[test]
    fn test_context_formatting() {
        let mut memory = TieredMemory::in_memory("a");
        memory.update_environment_context(object(json!({"workspace": "demo", "round": 2})));
        memory.update_working_memory("goal", json!("ship it"));
        memory.add_to_short_term(ShortTermItem::new(Role::User, "x".repeat(250)));
        memory.add_to_short_term(ShortTermItem::new(Role::Assistant, "ok"));

        let context = memory.get_context_for_llm(10);
        let expected = format!(
            "Environment Context:\n  round: 2\n  workspace: demo\n\nCurrent Task Context:\n  goal: ship it\n\nRecent Conversation:\n  user: {}\n  assistant: ok",
            "x".repeat(200)
        );
        assert_eq!(context, expected);
    }

    #[test]
    fn test_context_respects_max_messages() {
        let mut memory = TieredMemory::in_memory("a");
        for i in 0..5 {
            memory.add_to_short_term(ShortTermItem::new(Role::User, format!("m{}", i)));
        }
        let context = memory.get_context_for_llm(2);
        assert!(context.contains("m3"));
        assert!(context.contains("m4"));
        assert!(!context.contains("m2"));
    }

    #[test]
    fn test_environment_merges() {
        let mut memory = TieredMemory::in_memory("a");
        memory.update_environment_context(object(json!({"a": 1, "b": 2})));
        memory.update_environment_context(object(json!({"b": 3, "c": 4})));

        let env = memory.get_environment_context();
        assert_eq!(env.get("a"), Some(&json!(1)));
        assert_eq!(env.get("b"), Some(&json!(3)));
        assert_eq!(env.get("c"), Some(&json!(4)));
    }

    #[test]
    fn test_working_memory_last_write_wins_and_cleanup() {
        let mut memory = TieredMemory::in_memory("a");
        memory.update_working_memory("k", json!(1));
        memory.update_working_memory("k", json!(2));
        assert_eq!(memory.get_working_memory("k"), Some(&json!(2)));

        memory.cleanup();
        assert!(memory.get_working_memory("k").is_none());
    }

    #[tokio::test]
    async fn test_importance_out_of_range_rejected() {
        let memory = TieredMemory::in_memory("a");
        let err = memory
            .add_to_long_term("fact", "too important", json!({}), 1.5)
            .await
            .unwrap_err();
        assert!(matches!(err, EnsembleError::ValidationError(_)));
        assert!(memory
            .add_to_long_term("fact", "nan", json!({}), f64::NAN)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_update_task_noop_without_fields() {
        let memory = TieredMemory::in_memory("a");
        memory.save_task("t", "desc", TaskStatus::Started).await.unwrap();

        assert!(!memory.update_task("t", None, None).await.unwrap());
        let task = memory.get_task("t").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Started);
        assert!(task.completed_at.is_none());

        assert!(memory
            .update_task("t", Some(TaskStatus::Completed), Some("r".to_string()))
            .await
            .unwrap());
        let task = memory.get_task("t").await.unwrap().unwrap();
        assert!(task.completed_at.is_some());
        assert_eq!(memory.get_task_history(5, None).await.unwrap().len(), 1);
    }
}
