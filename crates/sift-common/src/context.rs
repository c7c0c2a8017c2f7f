//! Per-task context passed explicitly through a scan.
//!
//! The context carries the task id plus arbitrary caller-supplied parameters.
//! It is handed to the scan entry point, the progress sink and the analyzer,
//! so nothing relies on ambient global state.

use crate::id::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys owned by the engine. Caller parameters never override these.
pub const RESERVED_CONTEXT_KEYS: &[&str] = &["task_id", "analyzer_id", "created_at"];

/// Explicit context value for one analysis task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, Value>,
    #[serde(skip)]
    rejected: Vec<String>,
}

impl TaskContext {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            analyzer_id: None,
            created_at: chrono::Utc::now(),
            params: BTreeMap::new(),
            rejected: Vec::new(),
        }
    }

    pub fn with_analyzer(mut self, analyzer_id: impl Into<String>) -> Self {
        self.analyzer_id = Some(analyzer_id.into());
        self
    }

    /// Merge caller parameters, dropping any that collide with reserved keys.
    pub fn with_params<I, K>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in params {
            self.insert_param(key, value);
        }
        self
    }

    /// Insert one caller parameter. Returns false when the key is reserved.
    pub fn insert_param(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if RESERVED_CONTEXT_KEYS.contains(&key.as_str()) {
            self.rejected.push(key);
            return false;
        }
        self.params.insert(key, value);
        true
    }

    /// Look up a key, reserved keys included.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "task_id" => Some(Value::String(self.task_id.to_string())),
            "analyzer_id" => self.analyzer_id.clone().map(Value::String),
            "created_at" => Some(Value::String(self.created_at.to_rfc3339())),
            _ => self.params.get(key).cloned(),
        }
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// Caller keys that were dropped because they are reserved.
    pub fn rejected_keys(&self) -> &[String] {
        &self.rejected
    }

    /// Flattened view: caller params overlaid by the reserved keys.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let mut map = self.params.clone();
        for key in RESERVED_CONTEXT_KEYS {
            if let Some(value) = self.get(key) {
                map.insert((*key).to_string(), value);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reserved_keys_cannot_be_overridden() {
        let id = TaskId::new();
        let ctx = TaskContext::new(id.clone()).with_params(vec![
            ("task_id", json!("forged")),
            ("device", json!("pixel-7")),
        ]);

        assert_eq!(ctx.get("task_id"), Some(json!(id.to_string())));
        assert_eq!(ctx.get("device"), Some(json!("pixel-7")));
        assert_eq!(ctx.rejected_keys(), &["task_id".to_string()]);
    }

    #[test]
    fn test_to_map_contains_reserved_and_params() {
        let ctx = TaskContext::new(TaskId::new())
            .with_analyzer("builtin.crash_detector")
            .with_params(vec![("build", json!(42))]);
        let map = ctx.to_map();
        assert!(map.contains_key("task_id"));
        assert!(map.contains_key("created_at"));
        assert_eq!(map["analyzer_id"], json!("builtin.crash_detector"));
        assert_eq!(map["build"], json!(42));
    }

    #[test]
    fn test_analyzer_id_absent_by_default() {
        let ctx = TaskContext::new(TaskId::new());
        assert_eq!(ctx.get("analyzer_id"), None);
        assert_eq!(ctx.get("missing"), None);
    }
}
