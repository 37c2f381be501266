//! Splendor Ratings - skill ratings for multiplayer Splendor games
//!
//! This crate records finished games and keeps a Plackett-Luce skill estimate
//! for every player, updated atomically and independent of submission order.

pub mod config;
pub mod error;
pub mod leaderboard;
pub mod metrics;
pub mod pipeline;
pub mod rating;
pub mod service;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{RatingError, Result};
pub use types::*;

// Re-export key components
pub use pipeline::GameProcessor;
pub use rating::{PlackettLuceCalculator, RatingCalculator};
pub use storage::{InMemoryRatingStore, RatingStore, SqliteRatingStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
