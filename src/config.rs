use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "plain-language-lens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Ollama instance.
pub const DEFAULT_MODEL_URL: &str = "http://localhost:11434";

/// Generation for a whole leaflet can be slow on CPU-only hosts.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Negative keep_alive keeps the model resident between requests.
pub const DEFAULT_KEEP_ALIVE: &str = "-1m";

pub const DEFAULT_MODEL: &str = "llama3";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "plain_language_lens=info,warn"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Runtime settings for the simplification backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LensConfig {
    /// Base URL of the Ollama server.
    pub model_url: String,
    pub timeout_secs: u64,
    pub keep_alive: String,
    /// Model selector used when the caller does not pass one.
    pub default_model: String,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl LensConfig {
    /// Load from the process environment, reading `.env` first if present.
    ///
    /// - `MODEL_URL`: Ollama base URL (default: "http://localhost:11434")
    /// - `MODEL_TIMEOUT_SECS`: request timeout (default: 300)
    /// - `MODEL_KEEP_ALIVE`: Ollama keep_alive (default: "-1m")
    /// - `LENS_MODEL`: default model selector (default: "llama3")
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let timeout_secs = match get("MODEL_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "MODEL_TIMEOUT_SECS",
                    value: raw,
                })?,
            None => defaults.timeout_secs,
        };

        Ok(Self {
            model_url: get("MODEL_URL").unwrap_or(defaults.model_url),
            timeout_secs,
            keep_alive: get("MODEL_KEEP_ALIVE").unwrap_or(defaults.keep_alive),
            default_model: get("LENS_MODEL").unwrap_or(defaults.default_model),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
