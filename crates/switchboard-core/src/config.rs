use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration for switchboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub quota: QuotaConfig,
    pub routing: RoutingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub groq: ProviderConfig,
    pub cerebras: ProviderConfig,
    pub openrouter: OpenRouterConfig,
    pub huggingface: ProviderConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: Option<String>,
}

/// OpenRouter supports several keys; the adapter rotates to the next one
/// when a key is rate limited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenRouterConfig {
    pub api_keys: Vec<String>,
    pub api_base: Option<String>,
}

/// Daily allowances for the finite tiers. Admin is always unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotaConfig {
    pub user_daily_limit: u32,
    pub subscriber_daily_limit: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            user_daily_limit: 3,
            subscriber_daily_limit: 5,
        }
    }
}

/// Retry and timeout policy for the fallback router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingConfig {
    /// Retries of the same candidate after a retryable failure.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub chat_timeout_secs: u64,
    pub image_generate_timeout_secs: u64,
    pub image_analyze_timeout_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            chat_timeout_secs: 30,
            image_generate_timeout_secs: 120,
            image_analyze_timeout_secs: 60,
        }
    }
}

// ====== Config loading/saving ======

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `SWITCHBOARD_CONFIG` env var — full JSON config
/// 2. Individual env vars (merged on top of the file config)
/// 3. File fallback (`~/.switchboard/config.json`)
pub fn load_config_from_env() -> Config {
    if let Ok(json) = std::env::var("SWITCHBOARD_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse SWITCHBOARD_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);

    if let Ok(v) = std::env::var("GROQ_API_KEY") {
        cfg.providers.groq.api_key = v;
    }
    if let Ok(v) = std::env::var("CEREBRAS_API_KEY") {
        cfg.providers.cerebras.api_key = v;
    }
    if let Ok(v) = std::env::var("HF_API_KEY") {
        cfg.providers.huggingface.api_key = v;
    }

    // OpenRouter keys: OPENROUTER_API_KEY plus numbered extras.
    let mut openrouter_keys = Vec::new();
    if let Ok(v) = std::env::var("OPENROUTER_API_KEY") {
        if !v.is_empty() {
            openrouter_keys.push(v);
        }
    }
    for i in 2..=10 {
        if let Ok(v) = std::env::var(format!("OPENROUTER_API_KEY{i}")) {
            if !v.is_empty() && !openrouter_keys.contains(&v) {
                openrouter_keys.push(v);
            }
        }
    }
    if !openrouter_keys.is_empty() {
        cfg.providers.openrouter.api_keys = openrouter_keys;
    }

    cfg
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
        .join("config.json")
}

/// Load configuration from file or fall back to defaults.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save configuration to file.
pub fn save_config(
    config: &Config,
    config_path: Option<&Path>,
) -> std::result::Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
