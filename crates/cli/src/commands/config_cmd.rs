//! `bonza config`: Configuration management commands.

use std::path::Path;

use bonza_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.default_provider);
            println!("   Model:     {}", config.default_model);
            println!(
                "   Fallback:  {} / {}",
                config.fallback.provider, config.fallback.model
            );
            println!("   Trust:     {}", config.autonomy.trust_level);
            println!("   Streaming: {}", config.streaming);
            println!(
                "   Telegram:  {}",
                if config.notifications.telegram.is_configured() {
                    "configured"
                } else {
                    "off"
                }
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

/// Write a default config file unless one already exists.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    if write_default(&config_path)? {
        println!("   ✅ Wrote {}", config_path.display());
    } else {
        println!("   Config already exists at {}", config_path.display());
    }
    Ok(())
}

fn write_default(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}

fn redacted(mut config: AppConfig) -> AppConfig {
    const HIDDEN: &str = "***";
    if config.api_key.is_some() {
        config.api_key = Some(HIDDEN.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(HIDDEN.into());
        }
    }
    if config.notifications.telegram.bot_token.is_some() {
        config.notifications.telegram.bot_token = Some(HIDDEN.into());
    }
    config
}

fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.has_api_key() && config.providers.values().all(|p| p.api_key.is_none()) {
        warnings.push("No API key set (set BONZA_API_KEY or NVIDIA_API_KEY)".to_string());
    }

    if !config.providers.contains_key(&config.fallback.provider)
        && bonza_providers::router::default_base_url(&config.fallback.provider).is_none()
    {
        warnings.push(format!(
            "Fallback provider '{}' has no endpoint; failover is disabled",
            config.fallback.provider
        ));
    }

    if config.notifications.telegram.bot_token.is_some()
        && config.notifications.telegram.chat_ids.is_empty()
    {
        warnings.push("Telegram bot token set but no chat_ids configured".to_string());
    }

    warnings
}
