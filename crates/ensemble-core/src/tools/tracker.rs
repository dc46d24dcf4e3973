//! Execution history and per-tool running statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};

const RESULT_PREVIEW_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub tool_name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub success: bool,
    /// Seconds
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ToolStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub avg_duration: f64,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ExecutionTracker {
    history: VecDeque<ExecutionRecord>,
    stats: HashMap<String, ToolStats>,
    history_limit: usize,
}

impl ExecutionTracker {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history: VecDeque::new(),
            stats: HashMap::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn record(
        &mut self,
        tool_name: &str,
        arguments: &Value,
        result: Option<&Value>,
        success: bool,
        duration: f64,
        error: Option<String>,
    ) {
        let now = Utc::now();

        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(ExecutionRecord {
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
            result: result.map(preview),
            success,
            duration,
            error,
            timestamp: now,
        });

        let stats = self.stats.entry(tool_name.to_string()).or_default();
        stats.total_calls += 1;
        if success {
            stats.successful_calls += 1;
        } else {
            stats.failed_calls += 1;
        }
        let n = stats.total_calls as f64;
        stats.avg_duration = (stats.avg_duration * (n - 1.0) + duration) / n;
        stats.last_used = Some(now);
    }

    pub fn get_tool_statistics(&self, tool_name: &str) -> Option<ToolStats> {
        self.stats.get(tool_name).cloned()
    }

    pub fn all_statistics(&self) -> BTreeMap<String, ToolStats> {
        self.stats
            .iter()
            .map(|(name, stats)| (name.clone(), stats.clone()))
            .collect()
    }

    /// The last `limit` executions, oldest first, optionally for a single tool.
    pub fn get_execution_history(
        &self,
        tool_name: Option<&str>,
        limit: usize,
    ) -> Vec<ExecutionRecord> {
        let matching: Vec<&ExecutionRecord> = self
            .history
            .iter()
            .filter(|r| tool_name.map_or(true, |name| r.tool_name == name))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Tool names by total calls, highest first. Ties are ordered by name.
    pub fn get_most_used_tools(&self, limit: usize) -> Vec<(String, u64)> {
        let mut usage: Vec<(String, u64)> = self
            .stats
            .iter()
            .map(|(name, stats)| (name.clone(), stats.total_calls))
            .collect();
        usage.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        usage.truncate(limit);
        usage
    }
}

fn preview(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.chars().take(RESULT_PREVIEW_LIMIT).collect()
}
