use secrecy::SecretString;
use tracing::Level;
use voxlink_core::{DEFAULT_EXECUTOR_URL, prompt::DEFAULT_MODEL};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// When absent the key is read from the terminal before connecting.
    pub gemini_api_key: Option<SecretString>,
    pub model: String,
    pub live_api_url: String,
    pub executor_url: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let live_api_url = std::env::var("LIVE_API_URL")
            .unwrap_or_else(|_| gemini_realtime::DEFAULT_LIVE_API_URL.to_string());
        if !(live_api_url.starts_with("wss://") || live_api_url.starts_with("ws://")) {
            return Err(ConfigError::InvalidValue(
                "LIVE_API_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", live_api_url),
            ));
        }

        let executor_url =
            std::env::var("EXECUTOR_URL").unwrap_or_else(|_| DEFAULT_EXECUTOR_URL.to_string());
        if !(executor_url.starts_with("http://") || executor_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "EXECUTOR_URL".to_string(),
                format!("'{}' is not an http:// or https:// URL", executor_url),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            gemini_api_key,
            model,
            live_api_url,
            executor_url,
            log_level,
        })
    }
}
