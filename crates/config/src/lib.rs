//! Configuration loading, validation, and management for Bonza.
//!
//! Loads configuration from `~/.bonza/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use bonza_core::{AutonomySettings, ModelCatalog, ModelInfo, TrustLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.bonza/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Stream model output by default
    #[serde(default = "default_true")]
    pub streaming: bool,

    /// Where a failed model call is retried
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Autonomy and approval settings
    #[serde(default)]
    pub autonomy: AutonomyConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Known models, keyed by user-facing name
    #[serde(default = "default_models")]
    pub models: HashMap<String, ModelConfig>,

    /// Out-of-band notifications
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_provider() -> String {
    "nvidia".into()
}
fn default_model() -> String {
    "llama-3.3-70b".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("streaming", &self.streaming)
            .field("fallback", &self.fallback)
            .field("agent", &self.agent)
            .field("autonomy", &self.autonomy)
            .field("providers", &self.providers)
            .field("models", &self.models)
            .field("notifications", &self.notifications)
            .finish()
    }
}

/// Per-provider connection settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// The one-shot failover target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model rounds that request tools, per turn
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Suggest a new chat once the history grows past this many tokens
    #[serde(default = "default_new_chat_threshold")]
    pub new_chat_threshold_tokens: usize,
}

fn default_max_tool_iterations() -> usize {
    25
}
fn default_new_chat_threshold() -> usize {
    100_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            new_chat_threshold_tokens: default_new_chat_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// Initial trust level: "cautious", "balanced" or "autonomous"
    #[serde(default)]
    pub trust_level: TrustLevel,

    /// Glob patterns for commands that run without asking under balanced trust
    #[serde(default)]
    pub auto_approve_patterns: Vec<String>,

    /// Send a notification whenever a tool call waits for approval
    #[serde(default = "default_true")]
    pub notify_on_pending: bool,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            trust_level: TrustLevel::default(),
            auto_approve_patterns: vec![],
            notify_on_pending: true,
        }
    }
}

impl AutonomyConfig {
    /// Build the shared runtime settings seeded from this config.
    pub fn to_settings(&self) -> AutonomySettings {
        AutonomySettings::new(
            self.trust_level,
            self.auto_approve_patterns.clone(),
            self.notify_on_pending,
        )
    }
}

/// A model entry in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,

    /// Wire id; defaults to the entry name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default = "default_true")]
    pub supports_tools: bool,

    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

fn default_context_window() -> usize {
    128_000
}

fn default_models() -> HashMap<String, ModelConfig> {
    let entry = |provider: &str, id: &str, tools: bool, window: usize| ModelConfig {
        provider: provider.into(),
        id: Some(id.into()),
        supports_tools: tools,
        context_window: window,
    };
    HashMap::from([
        (
            "llama-3.3-70b".to_string(),
            entry("nvidia", "meta/llama-3.3-70b-instruct", true, 128_000),
        ),
        (
            "kimi-k2.5".to_string(),
            entry("nvidia", "moonshotai/kimi-k2.5", true, 128_000),
        ),
        (
            "deepseek-chat".to_string(),
            entry("deepseek", "deepseek-chat", true, 64_000),
        ),
        (
            "deepseek-reasoner".to_string(),
            entry("deepseek", "deepseek-reasoner", false, 64_000),
        ),
    ])
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Chats that receive pending-approval notifications
    #[serde(default)]
    pub chat_ids: Vec<i64>,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|t| !t.is_empty()) && !self.chat_ids.is_empty()
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("chat_ids", &self.chat_ids)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.bonza/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `BONZA_API_KEY` (highest priority)
    /// - `NVIDIA_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("BONZA_API_KEY")
                .ok()
                .or_else(|| std::env::var("NVIDIA_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("BONZA_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("BONZA_MODEL") {
            self.default_model = model;
        }

        if self.notifications.telegram.bot_token.is_none() {
            self.notifications.telegram.bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".bonza")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }

        for pattern in &self.autonomy.auto_approve_patterns {
            if pattern.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "autonomy.auto_approve_patterns must not contain empty patterns".into(),
                ));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The API key for a provider, falling back to the global key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// The model catalog built from `[models.*]`.
    pub fn model_catalog(&self) -> ModelCatalog {
        self.models
            .iter()
            .map(|(name, m)| {
                (
                    name.clone(),
                    ModelInfo {
                        provider: m.provider.clone(),
                        id: m.id.clone().unwrap_or_else(|| name.clone()),
                        supports_tools: m.supports_tools,
                        context_window: m.context_window,
                    },
                )
            })
            .collect()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            streaming: true,
            fallback: FallbackConfig::default(),
            agent: AgentConfig::default(),
            autonomy: AutonomyConfig::default(),
            providers: HashMap::new(),
            models: default_models(),
            notifications: NotificationsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
