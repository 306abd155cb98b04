use atc_core::ControllerSettings;
use atc_core::llm_client::{GeneratorSettings, Phraseology};
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub llm_enabled: bool,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_max_attempts: u32,
    pub phraseology: Phraseology,
    pub default_runway: String,
    pub default_taxiway: String,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = var_or("BIND_ADDRESS", "0.0.0.0:3000")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let llm_enabled_str = var_or("LLM_ENABLED", "true");
        let llm_enabled = llm_enabled_str.to_lowercase().parse::<bool>().map_err(|_| {
            ConfigError::InvalidValue(
                "LLM_ENABLED".to_string(),
                format!("'{}' is not true or false", llm_enabled_str),
            )
        })?;

        let llm_base_url = var_or("LLM_BASE_URL", "http://localhost:11434/v1");
        let llm_api_key = std::env::var("LLM_API_KEY").ok();
        let llm_model = var_or("LLM_MODEL", "llama3.2:3b");

        let attempts_str = var_or("LLM_MAX_ATTEMPTS", "3");
        let llm_max_attempts = attempts_str
            .parse::<u32>()
            .ok()
            .filter(|n| (1..=3).contains(n))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "LLM_MAX_ATTEMPTS".to_string(),
                    format!("'{}' is not between 1 and 3", attempts_str),
                )
            })?;

        let phraseology = var_or("PHRASEOLOGY", "military")
            .parse::<Phraseology>()
            .map_err(|e| ConfigError::InvalidValue("PHRASEOLOGY".to_string(), e))?;

        let default_runway = var_or("DEFAULT_RUNWAY", "31");
        let default_taxiway = var_or("DEFAULT_TAXIWAY", "alpha");
        if default_runway.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_RUNWAY".to_string(),
                "must not be empty".to_string(),
            ));
        }

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            llm_enabled,
            llm_base_url,
            llm_api_key,
            llm_model,
            llm_max_attempts,
            phraseology,
            default_runway,
            default_taxiway,
            log_level,
        })
    }

    /// Settings for the OpenAI-compatible text generator.
    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            health_url: GeneratorSettings::health_url_for(&self.llm_base_url),
            base_url: self.llm_base_url.clone(),
            api_key: self.llm_api_key.clone(),
            model: self.llm_model.clone(),
            max_attempts: self.llm_max_attempts,
            ..Default::default()
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            phraseology: self.phraseology,
            default_runway: self.default_runway.clone(),
            default_taxiway: self.default_taxiway.clone(),
        }
    }
}
