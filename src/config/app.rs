//! Main application configuration
//!
//! This module defines the primary configuration structures for the rating
//! service, including environment variable and TOML loading and validation.

use crate::config::rating::RatingConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub rating: RatingConfig,
    pub pipeline: PipelineSettings,
    pub storage: StorageSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Game submission policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Fewest participants a game may have
    pub min_participants: usize,
    /// Most participants a game may have
    pub max_participants: usize,
    /// Commit attempts before a conflicting submission is given up on
    pub max_commit_attempts: u32,
    /// Delay between commit attempts in milliseconds
    pub retry_delay_ms: u64,
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite connection URL
    pub database_url: String,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "splendor-ratings".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_participants: 2,
            max_participants: 4,
            max_commit_attempts: 5,
            retry_delay_ms: 10,
        }
    }
}

impl PipelineSettings {
    /// Get commit retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://splendor_ratings.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Parse an environment variable if it is set
fn env_override<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", key, value)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still win
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Some(name) = env_override("SERVICE_NAME")? {
            self.service.name = name;
        }
        if let Some(log_level) = env_override("LOG_LEVEL")? {
            self.service.log_level = log_level;
        }

        // Rating model
        if let Some(mean) = env_override("RATING_INITIAL_MEAN")? {
            self.rating.initial_mean = mean;
        }
        if let Some(uncertainty) = env_override("RATING_INITIAL_UNCERTAINTY")? {
            self.rating.initial_uncertainty = uncertainty;
        }
        if let Some(beta) = env_override("RATING_BETA")? {
            self.rating.beta = beta;
        }
        if let Some(tau) = env_override("RATING_TAU")? {
            self.rating.tau = tau;
        }
        if let Some(kappa) = env_override("RATING_KAPPA")? {
            self.rating.kappa = kappa;
        }
        if let Some(shift) = env_override("RATING_MAX_MEAN_SHIFT")? {
            self.rating.max_mean_shift = shift;
        }

        // Pipeline policy
        if let Some(min) = env_override("MIN_PARTICIPANTS")? {
            self.pipeline.min_participants = min;
        }
        if let Some(max) = env_override("MAX_PARTICIPANTS")? {
            self.pipeline.max_participants = max;
        }
        if let Some(attempts) = env_override("MAX_COMMIT_ATTEMPTS")? {
            self.pipeline.max_commit_attempts = attempts;
        }
        if let Some(delay) = env_override("COMMIT_RETRY_DELAY_MS")? {
            self.pipeline.retry_delay_ms = delay;
        }

        // Storage
        if let Some(url) = env_override("DATABASE_URL")? {
            self.storage.database_url = url;
        }
        if let Some(connections) = env_override("DATABASE_MAX_CONNECTIONS")? {
            self.storage.max_connections = connections;
        }

        Ok(())
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    config.rating.validate()?;

    // Validate submission policy
    if config.pipeline.min_participants < 2 {
        return Err(anyhow!("A game needs at least 2 participants"));
    }
    if config.pipeline.max_participants < config.pipeline.min_participants {
        return Err(anyhow!(
            "Max participants ({}) is below min participants ({})",
            config.pipeline.max_participants,
            config.pipeline.min_participants
        ));
    }
    if config.pipeline.max_commit_attempts == 0 {
        return Err(anyhow!("Max commit attempts must be greater than 0"));
    }

    // Validate storage
    if config.storage.database_url.is_empty() {
        return Err(anyhow!("Database URL cannot be empty"));
    }
    if config.storage.max_connections == 0 {
        return Err(anyhow!("Database max connections must be greater than 0"));
    }

    Ok(())
}
