//! Model catalog: which provider serves a model and what it can do.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider key (e.g. "nvidia", "deepseek")
    pub provider: String,

    /// Model id sent on the wire
    pub id: String,

    /// Whether the model accepts tool schemas
    #[serde(default = "default_true")]
    pub supports_tools: bool,

    /// Context window in tokens
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

fn default_true() -> bool {
    true
}

fn default_context_window() -> usize {
    128_000
}

/// Models known to the process, keyed by their user-facing name.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, info: ModelInfo) {
        self.models.insert(name.into(), info);
    }

    pub fn get(&self, name: &str) -> Option<&ModelInfo> {
        self.models.get(name)
    }

    /// Unknown models are assumed not to accept tools.
    pub fn supports_tools(&self, name: &str) -> bool {
        self.get(name).is_some_and(|m| m.supports_tools)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl FromIterator<(String, ModelInfo)> for ModelCatalog {
    fn from_iter<I: IntoIterator<Item = (String, ModelInfo)>>(iter: I) -> Self {
        Self {
            models: iter.into_iter().collect(),
        }
    }
}
