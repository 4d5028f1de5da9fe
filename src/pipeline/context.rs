// src/pipeline/context.rs

//! Shared pipeline context.
//!
//! The context is handed opaquely to every plugin in the chain. It is a
//! mutably shared key/value store; ordering of mutations across plugins
//! is the plugin author's responsibility.

use std::collections::HashMap;
use std::sync::Mutex;

pub struct Context {
    pipeline_name: String,
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl Context {
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            values: Mutex::new(HashMap::new()),
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn set_value(&self, key: &str, value: serde_json::Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("pipeline_name", &self.pipeline_name)
            .finish_non_exhaustive()
    }
}
