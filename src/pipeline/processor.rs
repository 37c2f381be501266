//! Game processor: turns a submitted result into committed rating updates
//!
//! Each submission is validated, rated against one consistent snapshot of its
//! participants and committed as a unit. The commit is guarded by every
//! participant's version, so two games sharing a player cannot both build on
//! the same starting estimate; the loser of such a race re-reads and rates
//! again, up to the configured number of attempts.

use crate::config::PipelineSettings;
use crate::error::{RatingError, Result};
use crate::metrics::MetricsCollector;
use crate::pipeline::validation::validate_submission;
use crate::rating::RatingCalculator;
use crate::storage::{GameCommit, PlayerUpdate, RatingStore};
use crate::types::{
    GameParticipant, GameRecord, ParticipantResult, Player, PlayerId, RatedParticipant,
    SkillEstimate,
};
use crate::utils::{current_timestamp, generate_game_id};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Slack on the mean-shift bound for floating point rounding
const SHIFT_TOLERANCE: f64 = 1e-9;

/// Statistics about processor operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    /// Games written to the store
    pub games_committed: u64,
    /// Submissions refused before anything was written
    pub submissions_rejected: u64,
    /// Commit attempts that hit a changed participant
    pub commit_conflicts: u64,
    /// Submissions that ran out of commit attempts
    pub conflicts_exhausted: u64,
    /// Players registered through this processor
    pub players_registered: u64,
}

/// Chance of finishing first in a prospective game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinChance {
    pub player_id: PlayerId,
    pub name: String,
    pub rating: i64,
    pub win_probability: f64,
}

/// The game-processing pipeline
#[derive(Clone)]
pub struct GameProcessor {
    /// Where players and games live
    store: Arc<dyn RatingStore>,
    /// Rating model
    calculator: Arc<dyn RatingCalculator>,
    /// Participant bounds and retry behaviour
    policy: PipelineSettings,
    /// Processor statistics
    stats: Arc<RwLock<ProcessorStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
}

impl GameProcessor {
    /// Create a new processor with its own metrics registry
    pub fn new(
        store: Arc<dyn RatingStore>,
        calculator: Arc<dyn RatingCalculator>,
        policy: PipelineSettings,
    ) -> Result<Self> {
        let metrics_collector = Arc::new(MetricsCollector::new()?);
        Ok(Self::with_metrics(store, calculator, policy, metrics_collector))
    }

    /// Create a new processor reporting into an existing metrics collector
    pub fn with_metrics(
        store: Arc<dyn RatingStore>,
        calculator: Arc<dyn RatingCalculator>,
        policy: PipelineSettings,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            calculator,
            policy,
            stats: Arc::new(RwLock::new(ProcessorStats::default())),
            metrics_collector,
        }
    }

    pub fn store(&self) -> Arc<dyn RatingStore> {
        self.store.clone()
    }

    pub fn calculator(&self) -> Arc<dyn RatingCalculator> {
        self.calculator.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Get a copy of the current statistics
    pub fn stats(&self) -> Result<ProcessorStats> {
        let stats = self.stats.read().map_err(|_| RatingError::StorageError {
            message: "Failed to acquire stats lock".to_string(),
        })?;
        Ok(stats.clone())
    }

    fn update_stats(&self, update: impl FnOnce(&mut ProcessorStats)) {
        match self.stats.write() {
            Ok(mut stats) => update(&mut stats),
            Err(_) => warn!("Failed to acquire stats lock, dropping stats update"),
        }
    }

    /// Rate and record one finished game
    ///
    /// `results` holds one entry per participant in any order; placements use
    /// 1 for the winner and equal values for ties. On success the committed
    /// game is returned with participants in request order. On any error
    /// nothing has been written.
    pub async fn submit_game(&self, results: Vec<ParticipantResult>) -> Result<GameRecord> {
        debug!("Processing game submission with {} participants", results.len());

        match self.process(&results).await {
            Ok(game) => {
                self.metrics_collector
                    .record_game_committed(game.num_players());
                self.update_stats(|stats| stats.games_committed += 1);
                info!(
                    game_id = %game.id,
                    players = game.num_players(),
                    "Game committed"
                );
                Ok(game)
            }
            Err(e) => {
                match RatingError::find(&e) {
                    Some(rating_error) if rating_error.is_rejection() => {
                        self.metrics_collector.record_rejection(rating_error.label());
                        self.update_stats(|stats| stats.submissions_rejected += 1);
                        warn!("Game submission rejected: {}", rating_error);
                    }
                    Some(RatingError::ConcurrentConflict { attempts }) => {
                        self.metrics_collector.record_conflict_exhausted();
                        self.update_stats(|stats| stats.conflicts_exhausted += 1);
                        warn!("Game submission gave up after {} commit attempts", attempts);
                    }
                    _ => {
                        self.metrics_collector.record_failure();
                        error!("Game submission failed: {:#}", e);
                    }
                }
                Err(e)
            }
        }
    }

    async fn process(&self, results: &[ParticipantResult]) -> Result<GameRecord> {
        validate_submission(results, &self.policy)?;

        let attempts = self.policy.max_commit_attempts.max(1);
        let retry_delay = self.policy.retry_delay();

        for attempt in 1..=attempts {
            let commit = self.prepare(results).await?;

            let timer = self.metrics_collector.start_timer();
            let committed = self.store.commit_game(commit).await;
            self.metrics_collector.record_commit(timer.stop());

            match committed {
                Ok(game) => return Ok(game),
                Err(e)
                    if RatingError::find(&e).is_some_and(RatingError::is_retryable_commit) =>
                {
                    self.metrics_collector.record_commit_conflict();
                    self.update_stats(|stats| stats.commit_conflicts += 1);
                    debug!("Commit attempt {}/{} did not land: {}", attempt, attempts, e);

                    if attempt < attempts && !retry_delay.is_zero() {
                        tokio::time::sleep(retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(RatingError::ConcurrentConflict { attempts }.into())
    }

    /// Read the participants and compute everything the game will write
    async fn prepare(&self, results: &[ParticipantResult]) -> Result<GameCommit> {
        let ids: Vec<PlayerId> = results.iter().map(|r| r.player_id).collect();
        let snapshot = self.store.snapshot(&ids).await?;

        let players = results
            .iter()
            .map(|r| {
                snapshot.get(&r.player_id).ok_or(RatingError::PlayerNotFound {
                    player_id: r.player_id,
                })
            })
            .collect::<std::result::Result<Vec<&Player>, _>>()?;

        let revised = self.rate_canonically(results, &players)?;

        let mut participants = Vec::with_capacity(results.len());
        let mut updates = Vec::with_capacity(results.len());
        for ((result, player), after) in results.iter().zip(&players).zip(revised) {
            participants.push(GameParticipant {
                player_id: result.player_id,
                placement: result.placement,
                points: result.points,
                before: player.estimate,
                after,
            });
            updates.push(PlayerUpdate {
                player_id: result.player_id,
                expected_version: player.version,
                estimate: after,
                aggregate: player
                    .aggregate
                    .record_game(result.placement, result.points)
                    .with_context(|| format!("Player {}", result.player_id))?,
            });
        }

        Ok(GameCommit {
            game: GameRecord {
                id: generate_game_id(),
                played_at: current_timestamp(),
                participants,
            },
            updates,
        })
    }

    /// Run the model in player-id order and hand results back in request order
    fn rate_canonically(
        &self,
        results: &[ParticipantResult],
        players: &[&Player],
    ) -> Result<Vec<SkillEstimate>> {
        let mut order: Vec<usize> = (0..results.len()).collect();
        order.sort_by_key(|&index| results[index].player_id);

        let rated: Vec<RatedParticipant> = order
            .iter()
            .map(|&index| RatedParticipant {
                estimate: players[index].estimate,
                placement: results[index].placement,
            })
            .collect();

        let timer = self.metrics_collector.start_timer();
        let revised = self.calculator.rate(&rated)?;
        self.metrics_collector.record_rating_calculation(timer.stop());

        if revised.len() != rated.len() {
            return Err(RatingError::NumericDegeneracy {
                reason: format!(
                    "Model returned {} estimates for {} participants",
                    revised.len(),
                    rated.len()
                ),
            }
            .into());
        }

        let mut by_request = vec![SkillEstimate::new(0.0, 0.0); results.len()];
        for ((&index, input), output) in order.iter().zip(&rated).zip(revised) {
            self.check_revision(results[index].player_id, &input.estimate, &output)?;
            by_request[index] = output;
        }
        Ok(by_request)
    }

    /// A revised estimate must be finite and move no further than the model allows
    fn check_revision(
        &self,
        player_id: PlayerId,
        before: &SkillEstimate,
        after: &SkillEstimate,
    ) -> Result<()> {
        if !after.is_well_formed() {
            return Err(RatingError::NumericDegeneracy {
                reason: format!(
                    "Player {} got mean {} and uncertainty {}",
                    player_id, after.mean, after.uncertainty
                ),
            }
            .into());
        }

        let config = self.calculator.config();
        let inflated = (before.uncertainty.powi(2) + config.tau.powi(2)).sqrt();
        let bound = config.max_mean_shift * inflated * (1.0 + SHIFT_TOLERANCE) + SHIFT_TOLERANCE;
        let shift = (after.mean - before.mean).abs();
        if shift > bound {
            return Err(RatingError::NumericDegeneracy {
                reason: format!(
                    "Player {} mean moved by {:.3}, more than the bound {:.3}",
                    player_id, shift, bound
                ),
            }
            .into());
        }

        Ok(())
    }

    /// Register a new player at the model's initial estimate
    pub async fn register_player(&self, name: &str) -> Result<Player> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RatingError::InvalidPlayer {
                reason: "Player name cannot be blank".to_string(),
            }
            .into());
        }

        let player = self
            .store
            .create_player(name, self.calculator.initial_estimate())
            .await?;

        self.metrics_collector.record_player_registered();
        self.update_stats(|stats| stats.players_registered += 1);
        info!(player_id = %player.id, "Registered player {}", player.name);

        Ok(player)
    }

    /// Remove a player that has never been in a committed game
    pub async fn remove_player(&self, player_id: PlayerId) -> Result<()> {
        if !self.store.remove_player(player_id).await? {
            return Err(RatingError::PlayerNotFound { player_id }.into());
        }

        self.metrics_collector.record_player_removed();
        info!(%player_id, "Removed player");
        Ok(())
    }

    /// Win chances for a game that has not been played yet
    pub async fn preview(&self, player_ids: &[PlayerId]) -> Result<Vec<WinChance>> {
        if player_ids.len() < 2 {
            return Err(RatingError::InvalidSubmission {
                reason: "A preview needs at least 2 players".to_string(),
            }
            .into());
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = player_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(RatingError::InvalidSubmission {
                reason: format!("Player {} appears more than once", duplicate),
            }
            .into());
        }

        let snapshot = self.store.snapshot(player_ids).await?;
        let players = player_ids
            .iter()
            .map(|id| {
                snapshot
                    .get(id)
                    .ok_or(RatingError::PlayerNotFound { player_id: *id })
            })
            .collect::<std::result::Result<Vec<&Player>, _>>()?;

        let estimates: Vec<SkillEstimate> = players.iter().map(|p| p.estimate).collect();
        let probabilities = self.calculator.win_probabilities(&estimates)?;

        Ok(players
            .into_iter()
            .zip(probabilities)
            .map(|(player, win_probability)| WinChance {
                player_id: player.id,
                name: player.name.clone(),
                rating: player.rating(),
                win_probability,
            })
            .collect())
    }
}
