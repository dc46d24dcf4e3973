//! Fixed-capacity ring buffer for the most recent conversation items.
//!
//! Once the buffer is full every insertion evicts the oldest item, so the
//! buffer always holds the last `capacity` items in insertion order.

use crate::core_types::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortTermItem {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ShortTermItem {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            task_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ShortTermBuffer {
    items: VecDeque<ShortTermItem>,
    capacity: usize,
}

impl ShortTermBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: ShortTermItem) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Most recent `limit` items, oldest first. `None` returns everything.
    pub fn recent(&self, limit: Option<usize>) -> Vec<ShortTermItem> {
        let take = limit.unwrap_or(self.items.len()).min(self.items.len());
        self.items
            .iter()
            .skip(self.items.len() - take)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_last_items_in_order() {
        let mut buffer = ShortTermBuffer::new(20);
        for i in 0..27 {
            buffer.push(ShortTermItem::new(Role::User, format!("item {}", i)));
        }

        let items = buffer.recent(None);
        assert_eq!(items.len(), 20);
        assert_eq!(items[0].content, "item 7");
        assert_eq!(items[19].content, "item 26");
    }

    #[test]
    fn test_recent_limit() {
        let mut buffer = ShortTermBuffer::new(5);
        for i in 0..4 {
            buffer.push(ShortTermItem::new(Role::Assistant, i.to_string()));
        }

        let last_two: Vec<String> = buffer.recent(Some(2)).into_iter().map(|i| i.content).collect();
        assert_eq!(last_two, vec!["2", "3"]);
        assert_eq!(buffer.recent(Some(10)).len(), 4);
        assert!(buffer.recent(Some(0)).is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut buffer = ShortTermBuffer::new(0);
        buffer.push(ShortTermItem::new(Role::User, "a"));
        buffer.push(ShortTermItem::new(Role::User, "b"));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.recent(None)[0].content, "b");
    }
}
