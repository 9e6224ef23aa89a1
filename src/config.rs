use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

use crate::llm_providers::LLMProviderType;

// Import logging macros
use crate::{log_system_event, log_validation};

const PLACEHOLDER_API_KEY: &str = "your-api-key";

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub assembly: AssemblyConfig,
    pub llm: Option<LLMConfig>,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Quiz assembly tuning
#[derive(Debug, Clone, Deserialize)]
pub struct AssemblyConfig {
    /// Used when a class has no bank sampling probability of its own.
    pub default_bank_probability: f64,
    pub class_cache_ttl_secs: u64,
    pub class_cache_max_entries: usize,
    pub target_step: f64,
    pub target_window: usize,
}

/// Optional LLM question generation
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub provider: LLMProviderType,
    pub model: Option<String>,
    /// Topics that get an LLM generator for every grade.
    pub topics: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            assembly: AssemblyConfig::from_env()?,
            llm: LLMConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            default_bank_probability = self.assembly.default_bank_probability,
            class_cache_ttl_secs = self.assembly.class_cache_ttl_secs,
            llm_provider = ?self.llm.as_ref().map(|llm| llm.provider),
            llm_api_key_masked = ?self.llm.as_ref().map(|llm| mask_sensitive_data(&llm.api_key)),
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if let Err(error) = self.check_values() {
            log_validation!(failure, "configuration", error = error);
            return Err(error);
        }

        if self.llm.is_none() {
            info!("No LLM API key configured - only built-in generators will be used");
        }

        let base_level = self.logging.level.split(',').next().unwrap_or_default().to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&base_level.as_str()) {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }

    fn check_values(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        let probability = self.assembly.default_bank_probability;
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(anyhow!(
                "DEFAULT_BANK_PROBABILITY must be between 0 and 1, got {}",
                probability
            ));
        }

        if self.assembly.class_cache_ttl_secs == 0 {
            return Err(anyhow!("CLASS_CACHE_TTL_SECS must be greater than 0"));
        }

        if self.assembly.class_cache_max_entries == 0 {
            return Err(anyhow!("CLASS_CACHE_MAX_ENTRIES must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.assembly.target_step) || self.assembly.target_window == 0 {
            return Err(anyhow!("TARGET_STEP must be within [0, 1] and TARGET_WINDOW positive"));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:adaptive_quiz.db".to_string());

        Ok(DatabaseConfig { url })
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let port = parse_env("PORT", 3000u16)?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,adaptive_quiz=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            default_bank_probability: 0.5,
            class_cache_ttl_secs: 300,
            class_cache_max_entries: 256,
            target_step: 0.1,
            target_window: 10,
        }
    }
}

impl AssemblyConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = AssemblyConfig::default();

        Ok(AssemblyConfig {
            default_bank_probability: parse_env("DEFAULT_BANK_PROBABILITY", defaults.default_bank_probability)?,
            class_cache_ttl_secs: parse_env("CLASS_CACHE_TTL_SECS", defaults.class_cache_ttl_secs)?,
            class_cache_max_entries: parse_env("CLASS_CACHE_MAX_ENTRIES", defaults.class_cache_max_entries)?,
            target_step: parse_env("TARGET_STEP", defaults.target_step)?,
            target_window: parse_env("TARGET_WINDOW", defaults.target_window)?,
        })
    }
}

impl LLMConfig {
    /// Returns `None` unless a real API key is configured.
    pub fn from_env() -> Result<Option<Self>> {
        let api_key = match env::var("LLM_API_KEY") {
            Ok(key) if !key.trim().is_empty() && key != PLACEHOLDER_API_KEY => key,
            _ => return Ok(None),
        };

        let provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = LLMProviderType::parse(&provider_str).unwrap_or_else(|| {
            info!("Unknown LLM provider '{}', defaulting to OpenAI", provider_str);
            LLMProviderType::OpenAI
        });

        Ok(Some(LLMConfig {
            api_key,
            base_url: env::var("LLM_BASE_URL").ok(),
            provider,
            model: env::var("LLM_MODEL").ok(),
            topics: env::var("LLM_TOPICS")
                .unwrap_or_default()
                .split(',')
                .map(|topic| topic.trim().to_string())
                .filter(|topic| !topic.is_empty())
                .collect(),
        }))
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
pub fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
            },
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
            assembly: AssemblyConfig::default(),
            llm: None,
        }
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:adaptive_quiz.db"), "sqli***z.db");
        assert_eq!(mask_sensitive_data("sk-1234567890abcdef"), "sk-1***cdef");
    }

    #[test]
    fn test_assembly_defaults() {
        let defaults = AssemblyConfig::default();
        assert_eq!(defaults.default_bank_probability, 0.5);
        assert_eq!(defaults.class_cache_ttl_secs, 300);
        assert_eq!(defaults.class_cache_max_entries, 256);
        assert_eq!(defaults.target_window, 10);
    }

    #[test]
    fn test_config_validation() {
        let config = valid_config();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.server.port = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.assembly.default_bank_probability = 1.5;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.assembly.class_cache_ttl_secs = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.database.url = "postgres://localhost/quiz".to_string();
        assert!(invalid.validate().is_err());
    }
}
