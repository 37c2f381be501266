//! In-memory rating storage
//!
//! All state sits behind one `RwLock`. A commit checks every participant's
//! version and applies every write while holding the write lock, so readers
//! see either the whole game or none of it.

use crate::error::{RatingError, Result};
use crate::storage::{history_entry, GameCommit, RatingStore};
use crate::types::{GameRecord, Player, PlayerAggregate, PlayerGameEntry, PlayerId, SkillEstimate};
use crate::utils::{current_timestamp, generate_player_id};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryState {
    players: HashMap<PlayerId, Player>,
    /// Committed games in commit order
    games: Vec<GameRecord>,
}

/// In-memory rating storage implementation
#[derive(Debug, Default)]
pub struct InMemoryRatingStore {
    state: RwLock<MemoryState>,
}

impl InMemoryRatingStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| {
            RatingError::StorageError {
                message: "Failed to acquire ratings read lock".to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| {
            RatingError::StorageError {
                message: "Failed to acquire ratings write lock".to_string(),
            }
            .into()
        })
    }

    /// Number of committed games
    pub fn game_count(&self) -> Result<usize> {
        Ok(self.read()?.games.len())
    }
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn create_player(&self, name: &str, initial: SkillEstimate) -> Result<Player> {
        let mut state = self.write()?;

        if state.players.values().any(|p| p.name == name) {
            return Err(RatingError::DuplicatePlayer {
                name: name.to_string(),
            }
            .into());
        }

        let player = Player {
            id: generate_player_id(),
            name: name.to_string(),
            estimate: initial,
            aggregate: PlayerAggregate::default(),
            version: 0,
            created_at: current_timestamp(),
        };
        state.players.insert(player.id, player.clone());

        Ok(player)
    }

    async fn get_player(&self, player_id: PlayerId) -> Result<Option<Player>> {
        Ok(self.read()?.players.get(&player_id).cloned())
    }

    async fn snapshot(&self, player_ids: &[PlayerId]) -> Result<HashMap<PlayerId, Player>> {
        let state = self.read()?;

        Ok(player_ids
            .iter()
            .filter_map(|id| state.players.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn commit_game(&self, commit: GameCommit) -> Result<GameRecord> {
        let mut state = self.write()?;

        // Check everything before touching anything
        for update in &commit.updates {
            let current = state.players.get(&update.player_id).ok_or(
                RatingError::PlayerNotFound {
                    player_id: update.player_id,
                },
            )?;
            if current.version != update.expected_version {
                return Err(RatingError::StaleSnapshot {
                    player_id: update.player_id,
                }
                .into());
            }
        }

        for update in commit.updates {
            if let Some(player) = state.players.get_mut(&update.player_id) {
                player.estimate = update.estimate;
                player.aggregate = update.aggregate;
                player.version += 1;
            }
        }
        state.games.push(commit.game.clone());

        debug!(game_id = %commit.game.id, "Committed game to memory store");
        Ok(commit.game)
    }

    async fn list_players(&self) -> Result<Vec<Player>> {
        let mut players: Vec<Player> = self.read()?.players.values().cloned().collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(players)
    }

    async fn remove_player(&self, player_id: PlayerId) -> Result<bool> {
        let mut state = self.write()?;

        match state.players.get(&player_id) {
            None => Ok(false),
            Some(player) if player.aggregate.games_played > 0 => {
                Err(RatingError::PlayerHasHistory { player_id }.into())
            }
            Some(_) => Ok(state.players.remove(&player_id).is_some()),
        }
    }

    async fn recent_games(&self, limit: usize) -> Result<Vec<GameRecord>> {
        Ok(self.read()?.games.iter().rev().take(limit).cloned().collect())
    }

    async fn player_history(&self, player_id: PlayerId, limit: usize) -> Result<Vec<PlayerGameEntry>> {
        Ok(self
            .read()?
            .games
            .iter()
            .rev()
            .filter_map(|game| history_entry(game, player_id))
            .take(limit)
            .collect())
    }
}
