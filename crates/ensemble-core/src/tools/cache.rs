//! TTL and size bounded cache of tool results.
//!
//! Entries are keyed by a SHA-256 digest of the tool name and its arguments
//! rendered as canonical JSON, so argument key order never affects hits.
//! Expired entries are dropped when read. When the cache is full, inserting a
//! new key evicts the single oldest entry by insertion time.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Value,
    inserted_at: Instant,
    sequence: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl_seconds: u64,
}

#[derive(Debug)]
pub struct ToolResultCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_size: usize,
    next_sequence: u64,
}

impl ToolResultCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_size: max_size.max(1),
            next_sequence: 0,
        }
    }

    pub fn cache_key(tool_name: &str, arguments: &Value) -> String {
        let canonical = canonicalize(arguments).to_string();
        let digest = Sha256::digest(format!("{}:{}", tool_name, canonical).as_bytes());
        format!("{:x}", digest)
    }

    pub fn get(&mut self, tool_name: &str, arguments: &Value) -> Option<Value> {
        let key = Self::cache_key(tool_name, arguments);
        let expired = match self.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };

        if expired {
            self.entries.remove(&key);
            return None;
        }
        self.entries.get(&key).map(|entry| entry.result.clone())
    }

    pub fn set(&mut self, tool_name: &str, arguments: &Value, result: Value) {
        let key = Self::cache_key(tool_name, arguments);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.inserted_at, entry.sequence))
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                log::debug!("Evicting oldest tool cache entry {}", oldest);
                self.entries.remove(&oldest);
            }
        }

        self.next_sequence += 1;
        self.entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
                sequence: self.next_sequence,
            },
        );
    }

    pub fn contains(&self, tool_name: &str, arguments: &Value) -> bool {
        self.entries
            .contains_key(&Self::cache_key(tool_name, arguments))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get() {
        let mut cache = ToolResultCache::new(Duration::from_secs(300), 100);
        cache.set("t", &json!({"a": 1}), json!("R"));
        assert_eq!(cache.get("t", &json!({"a": 1})), Some(json!("R")));
        assert_eq!(cache.get("t", &json!({"a": 2})), None);
        assert_eq!(cache.get("other", &json!({"a": 1})), None);
    }

    #[test]
    fn test_key_ignores_argument_order() {
        let a = ToolResultCache::cache_key("t", &json!({"x": 1, "y": {"b": 2, "a": 1}}));
        let b = ToolResultCache::cache_key("t", &json!({"y": {"a": 1, "b": 2}, "x": 1}));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let mut cache = ToolResultCache::new(Duration::from_millis(20), 10);
        cache.set("t", &json!({"a": 1}), json!("R"));
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("t", &json!({"a": 1})), None);
        assert!(!cache.contains("t", &json!({"a": 1})));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_single_oldest_when_full() {
        let mut cache = ToolResultCache::new(Duration::from_secs(300), 3);
        for i in 0..4 {
            cache.set("t", &json!({ "i": i }), json!(i));
        }

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("t", &json!({"i": 0})));
        for i in 1..4 {
            assert!(cache.contains("t", &json!({ "i": i })));
        }
    }

    #[test]
    fn test_reads_do_not_refresh_age() {
        let mut cache = ToolResultCache::new(Duration::from_secs(300), 2);
        cache.set("t", &json!({"i": 0}), json!(0));
        cache.set("t", &json!({"i": 1}), json!(1));
        assert!(cache.get("t", &json!({"i": 0})).is_some());

        cache.set("t", &json!({"i": 2}), json!(2));
        assert!(!cache.contains("t", &json!({"i": 0})));
        assert!(cache.contains("t", &json!({"i": 1})));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let mut cache = ToolResultCache::new(Duration::from_secs(300), 2);
        cache.set("t", &json!({"i": 0}), json!(0));
        cache.set("t", &json!({"i": 1}), json!(1));
        cache.set("t", &json!({"i": 1}), json!("updated"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("t", &json!({"i": 1})), Some(json!("updated")));
    }

    #[test]
    fn test_stats() {
        let mut cache = ToolResultCache::new(Duration::from_secs(300), 100);
        cache.set("t", &json!({}), json!(null));
        assert_eq!(
            cache.stats(),
            CacheStats {
                size: 1,
                max_size: 100,
                ttl_seconds: 300
            }
        );
        cache.clear();
        assert_eq!(cache.stats().size, 0);
    }
}
