//! Main application state and service wiring
//!
//! Builds the store, the rating model and the pipeline from one `AppConfig`.

use crate::config::AppConfig;
use crate::metrics::MetricsCollector;
use crate::pipeline::GameProcessor;
use crate::rating::{PlackettLuceCalculator, RatingCalculator};
use crate::storage::{RatingStore, SqliteRatingStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage initialization error: {message}")]
    Storage { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Persistent player and game state
    store: Arc<dyn RatingStore>,

    /// Game-processing pipeline
    processor: GameProcessor,

    /// Metrics shared by every component
    metrics_collector: Arc<MetricsCollector>,
}

impl AppState {
    /// Initialize the application against the configured database
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing {}", config.service.name);
        info!(
            "Configuration: database_url={}, participants={}..={}",
            config.storage.database_url,
            config.pipeline.min_participants,
            config.pipeline.max_participants
        );

        let store = SqliteRatingStore::connect(
            &config.storage.database_url,
            config.storage.max_connections,
        )
        .await
        .map_err(|e| ServiceError::Storage {
            message: format!("{:#}", e),
        })?;

        Self::with_store(config, Arc::new(store)).await
    }

    /// Initialize the application on top of an already opened store
    pub async fn with_store(
        config: AppConfig,
        store: Arc<dyn RatingStore>,
    ) -> Result<Self, ServiceError> {
        let calculator = Self::initialize_calculator(&config)?;
        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let processor = GameProcessor::with_metrics(
            store.clone(),
            calculator,
            config.pipeline.clone(),
            metrics_collector.clone(),
        );

        let state = Self {
            config,
            store,
            processor,
            metrics_collector,
        };
        state.refresh_player_gauge().await;

        info!("Rating service ready");
        Ok(state)
    }

    fn initialize_calculator(config: &AppConfig) -> Result<Arc<dyn RatingCalculator>, ServiceError> {
        let calculator = PlackettLuceCalculator::new(config.rating.clone()).map_err(|e| {
            ServiceError::Configuration {
                message: format!("Invalid rating configuration: {}", e),
            }
        })?;

        info!("Rating model: {}", calculator.describe());
        Ok(Arc::new(calculator))
    }

    async fn refresh_player_gauge(&self) {
        match self.store.list_players().await {
            Ok(players) => self.metrics_collector.set_players_known(players.len()),
            Err(e) => warn!("Could not count players: {}", e),
        }
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn RatingStore> {
        self.store.clone()
    }

    pub fn processor(&self) -> &GameProcessor {
        &self.processor
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Log final statistics
    pub fn shutdown(&self) {
        match self.processor.stats() {
            Ok(stats) => info!("Final service statistics: {:?}", stats),
            Err(e) => warn!("Failed to get final stats: {}", e),
        }
    }
}
