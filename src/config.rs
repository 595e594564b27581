//! Configuration management for chatbridge.
//!
//! Configuration is read once (TOML file, then environment overrides) and
//! handed to adapters by value. Nothing here is global or mutable after
//! construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::ProviderKind;

/// Errors raised while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{0}")]
    UnknownProvider(String),

    #[error(
        "API key not found. Either:\n  \
         1. Set api_key in the [provider] section of {config_path}\n  \
         2. Set environment variable: export {env}=your-key"
    )]
    MissingApiKey { env: String, config_path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Immutable settings for one provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// Model used when a request names none
    pub model: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Caller-side limits (enforced by the caller, not the adapters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_max_message_chars() -> usize {
    10_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_chars: default_max_message_chars(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            provider: ProviderSettings {
                kind: ProviderKind::OpenAiCompatible,
                model: "gpt-4o-mini".to_string(),
                api_base: Some("https://api.openai.com/v1".to_string()),
                api_key: None,
                api_key_env: default_api_key_env(),
                temperature: None,
                max_tokens: default_max_tokens(),
            },
            limits: LimitsConfig::default(),
        }
    }
}

impl ProviderSettings {
    /// Resolve the API key: config file first, then `api_key_env`.
    pub fn resolve_api_key(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        env(&self.api_key_env)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey {
                env: self.api_key_env.clone(),
                config_path: AppConfig::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.toml".to_string()),
            })
    }

    /// Copy of these settings with the API key resolved.
    pub fn with_resolved_key(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let key = self.resolve_api_key(env)?;
        Ok(Self {
            api_key: Some(key),
            ..self.clone()
        })
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".chatbridge").join("config.toml"))
    }

    /// Load from the default path with process environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `CHATBRIDGE_PROVIDER`, `CHATBRIDGE_MODEL` and
    /// `CHATBRIDGE_API_BASE` as looked up through `env`.
    pub fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(provider) = env("CHATBRIDGE_PROVIDER") {
            self.provider.kind = provider.parse().map_err(ConfigError::UnknownProvider)?;
        }
        if let Some(model) = env("CHATBRIDGE_MODEL") {
            self.provider.model = model;
        }
        if let Some(api_base) = env("CHATBRIDGE_API_BASE") {
            self.provider.api_base = Some(api_base);
        }
        Ok(())
    }

    /// Write the default config to `path`, creating parent directories.
    pub fn save_default_to(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(&Self::default())?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
