//! Test fixtures and store wrappers for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use splendor_ratings::config::{PipelineSettings, RatingConfig};
use splendor_ratings::error::{RatingError, Result};
use splendor_ratings::pipeline::GameProcessor;
use splendor_ratings::rating::{PlackettLuceCalculator, RatingCalculator};
use splendor_ratings::storage::{GameCommit, InMemoryRatingStore, RatingStore};
use splendor_ratings::types::{
    GameRecord, ParticipantResult, Placement, Player, PlayerGameEntry, PlayerId, SkillEstimate,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// What an [`InstrumentedStore`] does with a game commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Pass through to the wrapped store
    Apply,
    /// Fail every commit with a storage error, writing nothing
    Fail,
    /// Keep the commit for inspection and report success without writing
    Record,
}

/// In-memory store with hooks for failure injection and interleaving
#[derive(Debug)]
pub struct InstrumentedStore {
    inner: InMemoryRatingStore,
    mode: CommitMode,
    /// Yield to the scheduler after every snapshot so concurrent submissions interleave
    yield_after_snapshot: bool,
    commits: Mutex<Vec<GameCommit>>,
}

impl InstrumentedStore {
    pub fn new(mode: CommitMode) -> Self {
        Self {
            inner: InMemoryRatingStore::new(),
            mode,
            yield_after_snapshot: false,
            commits: Mutex::new(Vec::new()),
        }
    }

    pub fn interleaving() -> Self {
        Self {
            yield_after_snapshot: true,
            ..Self::new(CommitMode::Apply)
        }
    }

    /// Every commit this store has been handed, applied or not
    pub fn get_commits(&self) -> Vec<GameCommit> {
        self.commits
            .lock()
            .map(|commits| commits.clone())
            .unwrap_or_default()
    }

    pub fn game_count(&self) -> usize {
        self.inner.game_count().unwrap_or_default()
    }
}

#[async_trait]
impl RatingStore for InstrumentedStore {
    async fn create_player(&self, name: &str, initial: SkillEstimate) -> Result<Player> {
        self.inner.create_player(name, initial).await
    }

    async fn get_player(&self, player_id: PlayerId) -> Result<Option<Player>> {
        self.inner.get_player(player_id).await
    }

    async fn snapshot(&self, player_ids: &[PlayerId]) -> Result<HashMap<PlayerId, Player>> {
        let snapshot = self.inner.snapshot(player_ids).await?;
        if self.yield_after_snapshot {
            tokio::task::yield_now().await;
        }
        Ok(snapshot)
    }

    async fn commit_game(&self, commit: GameCommit) -> Result<GameRecord> {
        if let Ok(mut commits) = self.commits.lock() {
            commits.push(commit.clone());
        }

        match self.mode {
            CommitMode::Apply => self.inner.commit_game(commit).await,
            CommitMode::Fail => Err(RatingError::StorageError {
                message: "injected commit failure".to_string(),
            }
            .into()),
            CommitMode::Record => Ok(commit.game),
        }
    }

    async fn list_players(&self) -> Result<Vec<Player>> {
        self.inner.list_players().await
    }

    async fn remove_player(&self, player_id: PlayerId) -> Result<bool> {
        self.inner.remove_player(player_id).await
    }

    async fn recent_games(&self, limit: usize) -> Result<Vec<GameRecord>> {
        self.inner.recent_games(limit).await
    }

    async fn player_history(&self, player_id: PlayerId, limit: usize) -> Result<Vec<PlayerGameEntry>> {
        self.inner.player_history(player_id, limit).await
    }
}

pub fn test_policy() -> PipelineSettings {
    PipelineSettings {
        retry_delay_ms: 0,
        ..PipelineSettings::default()
    }
}

pub fn calculator() -> Arc<dyn RatingCalculator> {
    Arc::new(PlackettLuceCalculator::new(RatingConfig::default()).unwrap())
}

pub fn processor_for(store: Arc<dyn RatingStore>) -> GameProcessor {
    GameProcessor::new(store, calculator(), test_policy()).unwrap()
}

pub async fn register_all(processor: &GameProcessor, names: &[&str]) -> Vec<Player> {
    let mut players = Vec::with_capacity(names.len());
    for name in names {
        players.push(processor.register_player(name).await.unwrap());
    }
    players
}

/// Results for `players` with the given placements; points descend with placement
pub fn ranked(players: &[Player], placements: &[Placement]) -> Vec<ParticipantResult> {
    players
        .iter()
        .zip(placements)
        .map(|(player, &placement)| ParticipantResult {
            player_id: player.id,
            placement,
            points: 20 - placement as i64 * 3,
        })
        .collect()
}

pub fn rating_error(error: &anyhow::Error) -> RatingError {
    RatingError::find(error)
        .cloned()
        .unwrap_or_else(|| panic!("not a rating error: {:#}", error))
}
