//! Provider router: maps a model name to the provider that serves it.
//!
//! Handles provider creation from config and resolves user-facing model
//! names (`llama-3.3-70b`, `deepseek-chat`, ...) into [`ModelRoute`]s using
//! the model catalog.

use std::collections::HashMap;
use std::sync::Arc;

use bonza_config::AppConfig;
use bonza_core::error::ProviderError;
use bonza_core::model::ModelCatalog;
use bonza_core::provider::{ModelRoute, Provider};
use tracing::{debug, warn};

use crate::openai_compat::OpenAiCompatProvider;

/// Routes model names to registered providers.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    catalog: ModelCatalog,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider for uncatalogued models.
    pub fn new(default_provider: impl Into<String>, catalog: ModelCatalog) -> Self {
        Self {
            providers: HashMap::new(),
            catalog,
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Resolve a user-facing model name.
    ///
    /// Catalogued models go to their configured provider under their wire id.
    /// Anything else is passed verbatim to the default provider without
    /// tools, so history reaches it with tool traffic filtered out.
    pub fn resolve(&self, model: &str) -> Result<ModelRoute, ProviderError> {
        let (provider_name, wire_id, supports_tools) = match self.catalog.get(model) {
            Some(info) => (info.provider.as_str(), info.id.as_str(), info.supports_tools),
            None => {
                debug!(model, provider = %self.default_provider, "Model not in catalog");
                (self.default_provider.as_str(), model, false)
            }
        };

        let provider = self.get(provider_name).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "provider '{provider_name}' for model '{model}' is not registered"
            ))
        })?;

        Ok(ModelRoute::new(provider, wire_id, supports_tools))
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Build the router and the fallback route from configuration.
///
/// Every provider named anywhere in the config gets an OpenAI-compatible
/// client. Providers without a known endpoint and no `api_url` are skipped.
pub fn build_from_config(config: &AppConfig) -> (ProviderRouter, Option<ModelRoute>) {
    let mut router = ProviderRouter::new(&config.default_provider, config.model_catalog());

    let mut names: Vec<&str> = config.providers.keys().map(String::as_str).collect();
    names.extend(config.models.values().map(|m| m.provider.as_str()));
    names.push(&config.default_provider);
    names.push(&config.fallback.provider);
    names.sort_unstable();
    names.dedup();

    for name in names {
        let provider_config = config.providers.get(name);
        let base_url = provider_config
            .and_then(|p| p.api_url.clone())
            .or_else(|| default_base_url(name).map(String::from));

        let Some(base_url) = base_url else {
            warn!(provider = name, "No endpoint known for provider, skipping");
            continue;
        };

        let api_key = config.api_key_for(name).unwrap_or_default();
        router.register(
            name,
            Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)),
        );
    }

    let fallback = router.get(&config.fallback.provider).map(|provider| {
        let info = router.catalog().get(&config.fallback.model);
        ModelRoute::new(
            provider,
            info.map_or_else(|| config.fallback.model.clone(), |m| m.id.clone()),
            info.is_some_and(|m| m.supports_tools),
        )
    });

    if fallback.is_none() {
        warn!(
            provider = %config.fallback.provider,
            model = %config.fallback.model,
            "Fallback provider unavailable, failover disabled"
        );
    }

    (router, fallback)
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "nvidia" => Some("https://integrate.api.nvidia.com/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        _ => None,
    }
}
