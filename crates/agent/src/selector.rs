//! Model selection for a turn.

/// Picks the model name a turn runs on.
pub trait ModelSelector: Send + Sync {
    /// `override_model` is the user's explicit choice, if any.
    fn select(&self, message: &str, override_model: Option<&str>) -> String;

    /// Short label shown in stats.
    fn mode(&self) -> &str {
        "fixed"
    }
}

/// Always the configured default unless the user overrides it.
#[derive(Debug, Clone)]
pub struct FixedModelSelector {
    default_model: String,
}

impl FixedModelSelector {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
        }
    }
}

impl ModelSelector for FixedModelSelector {
    fn select(&self, _message: &str, override_model: Option<&str>) -> String {
        override_model
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string()
    }
}
