//! Error types for the rating service
//!
//! Errors travel as `anyhow::Error`; callers that need to tell a bad request
//! from a missing player or a transient conflict downcast to [`RatingError`].

use crate::types::PlayerId;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific rating scenarios
#[derive(Debug, Clone, thiserror::Error)]
pub enum RatingError {
    #[error("Invalid game submission: {reason}")]
    InvalidSubmission { reason: String },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: PlayerId },

    #[error("Concurrent update conflict after {attempts} attempt(s)")]
    ConcurrentConflict { attempts: u32 },

    #[error("Player {player_id} changed since it was read")]
    StaleSnapshot { player_id: PlayerId },

    #[error("Store is busy: {message}")]
    StoreBusy { message: String },

    #[error("Numeric degeneracy in rating update: {reason}")]
    NumericDegeneracy { reason: String },

    #[error("Invalid player: {reason}")]
    InvalidPlayer { reason: String },

    #[error("Player already exists: {name}")]
    DuplicatePlayer { name: String },

    #[error("Cannot remove player {player_id} with game history")]
    PlayerHasHistory { player_id: PlayerId },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },
}

impl RatingError {
    /// Caller-side mistakes: nothing was persisted and retrying won't help
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RatingError::InvalidSubmission { .. }
                | RatingError::PlayerNotFound { .. }
                | RatingError::InvalidPlayer { .. }
                | RatingError::DuplicatePlayer { .. }
                | RatingError::PlayerHasHistory { .. }
        )
    }

    /// Failures that may succeed if the same request is sent again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RatingError::ConcurrentConflict { .. }
                | RatingError::StaleSnapshot { .. }
                | RatingError::StoreBusy { .. }
        )
    }

    /// Commit failures worth answering with a fresh snapshot and another attempt
    pub fn is_retryable_commit(&self) -> bool {
        matches!(
            self,
            RatingError::StaleSnapshot { .. } | RatingError::StoreBusy { .. }
        )
    }

    /// Short snake_case name, used as a metrics label
    pub fn label(&self) -> &'static str {
        match self {
            RatingError::InvalidSubmission { .. } => "invalid_submission",
            RatingError::PlayerNotFound { .. } => "player_not_found",
            RatingError::ConcurrentConflict { .. } => "concurrent_conflict",
            RatingError::StaleSnapshot { .. } => "stale_snapshot",
            RatingError::StoreBusy { .. } => "store_busy",
            RatingError::NumericDegeneracy { .. } => "numeric_degeneracy",
            RatingError::InvalidPlayer { .. } => "invalid_player",
            RatingError::DuplicatePlayer { .. } => "duplicate_player",
            RatingError::PlayerHasHistory { .. } => "player_has_history",
            RatingError::ConfigurationError { .. } => "configuration_error",
            RatingError::StorageError { .. } => "storage_error",
        }
    }

    /// Find a `RatingError` in an `anyhow` chain, if there is one
    pub fn find(error: &anyhow::Error) -> Option<&RatingError> {
        error.chain().find_map(|cause| cause.downcast_ref::<RatingError>())
    }
}
