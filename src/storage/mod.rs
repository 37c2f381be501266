//! Rating persistence interface and implementations
//!
//! The store is the only place player estimates, aggregates and game records
//! live. Every game is written through [`RatingStore::commit_game`], which
//! applies all participant updates and the game record together or not at all.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryRatingStore;
pub use sqlite::SqliteRatingStore;

use crate::types::{
    GameRecord, Player, PlayerAggregate, PlayerGameEntry, PlayerId, SkillEstimate,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// New state for one participant of a committed game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    pub player_id: PlayerId,
    /// Version the update was computed from; the commit fails if it moved on
    pub expected_version: u64,
    pub estimate: SkillEstimate,
    pub aggregate: PlayerAggregate,
}

/// Everything one game writes, applied as a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameCommit {
    pub game: GameRecord,
    pub updates: Vec<PlayerUpdate>,
}

/// Trait for rating storage operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Register a player at the given starting estimate
    async fn create_player(&self, name: &str, initial: SkillEstimate) -> crate::error::Result<Player>;

    /// Get a single player
    async fn get_player(&self, player_id: PlayerId) -> crate::error::Result<Option<Player>>;

    /// Read several players in one consistent view; unknown ids are omitted
    async fn snapshot(
        &self,
        player_ids: &[PlayerId],
    ) -> crate::error::Result<HashMap<PlayerId, Player>>;

    /// Persist a game and its player updates atomically
    ///
    /// Fails with `RatingError::StaleSnapshot` if any player's version no
    /// longer matches `expected_version`; nothing is written in that case.
    async fn commit_game(&self, commit: GameCommit) -> crate::error::Result<GameRecord>;

    /// Get every registered player
    async fn list_players(&self) -> crate::error::Result<Vec<Player>>;

    /// Remove a player without game history; `false` if the id is unknown
    async fn remove_player(&self, player_id: PlayerId) -> crate::error::Result<bool>;

    /// Most recent games, newest first
    async fn recent_games(&self, limit: usize) -> crate::error::Result<Vec<GameRecord>>;

    /// A player's most recent games, newest first
    async fn player_history(
        &self,
        player_id: PlayerId,
        limit: usize,
    ) -> crate::error::Result<Vec<PlayerGameEntry>>;
}

/// Build a player's view of one committed game
pub(crate) fn history_entry(game: &GameRecord, player_id: PlayerId) -> Option<PlayerGameEntry> {
    game.participant(player_id).map(|participant| PlayerGameEntry {
        game_id: game.id,
        played_at: game.played_at,
        placement: participant.placement,
        points: participant.points,
        rating_change: participant.rating_change(),
        num_players: game.num_players(),
    })
}
