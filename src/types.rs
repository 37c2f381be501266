//! Common types used throughout the rating service

use crate::error::{RatingError, Result};
use crate::utils::round_to;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players
pub type PlayerId = Uuid;

/// Unique identifier for games
pub type GameId = Uuid;

/// Finishing position in one game, 1 = best. Tied players share a value.
pub type Placement = u32;

/// Number of placement buckets tracked per player (1st through 4th)
pub const PLACEMENT_BUCKETS: usize = 4;

/// Gaussian belief over a player's latent skill
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillEstimate {
    pub mean: f64,
    pub uncertainty: f64,
}

impl SkillEstimate {
    pub fn new(mean: f64, uncertainty: f64) -> Self {
        Self { mean, uncertainty }
    }

    /// Rating shown on the leaderboard
    pub fn display_rating(&self) -> i64 {
        self.mean.round() as i64
    }

    /// Finite mean and strictly positive, finite uncertainty
    pub fn is_well_formed(&self) -> bool {
        self.mean.is_finite() && self.uncertainty.is_finite() && self.uncertainty > 0.0
    }
}

/// One participant's input to the rating model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatedParticipant {
    pub estimate: SkillEstimate,
    pub placement: Placement,
}

/// Counters derived from committed games
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAggregate {
    pub games_played: u64,
    /// `placements[0]` counts first places, `placements[3]` fourth places
    pub placements: [u64; PLACEMENT_BUCKETS],
    pub total_points: i64,
}

impl PlayerAggregate {
    /// Aggregate after one more committed game
    ///
    /// Fails rather than wrapping when a counter would overflow.
    pub fn record_game(&self, placement: Placement, points: i64) -> Result<Self> {
        let overflow = |counter: &str| RatingError::InvalidSubmission {
            reason: format!("Recording this game would overflow {}", counter),
        };

        let mut next = self.clone();
        next.games_played = next
            .games_played
            .checked_add(1)
            .ok_or_else(|| overflow("games played"))?;
        next.total_points = next
            .total_points
            .checked_add(points)
            .ok_or_else(|| overflow("total points"))?;
        if let Some(bucket) = (placement as usize)
            .checked_sub(1)
            .and_then(|index| next.placements.get_mut(index))
        {
            *bucket = bucket
                .checked_add(1)
                .ok_or_else(|| overflow("placement count"))?;
        }
        Ok(next)
    }

    pub fn first_places(&self) -> u64 {
        self.placements[0]
    }

    /// Mean points per game, rounded to two decimals
    pub fn average_points(&self) -> f64 {
        if self.games_played == 0 {
            return 0.0;
        }
        round_to(self.total_points as f64 / self.games_played as f64, 2)
    }

    /// Percentage of games won, rounded to one decimal
    pub fn win_rate(&self) -> f64 {
        if self.games_played == 0 {
            return 0.0;
        }
        round_to(self.first_places() as f64 / self.games_played as f64 * 100.0, 1)
    }
}

/// A rated player as held by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub estimate: SkillEstimate,
    pub aggregate: PlayerAggregate,
    /// Bumped on every committed game; used to detect concurrent updates
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn rating(&self) -> i64 {
        self.estimate.display_rating()
    }
}

/// Inbound result for one participant of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub player_id: PlayerId,
    pub placement: Placement,
    pub points: i64,
}

/// Immutable per-participant row of a committed game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameParticipant {
    pub player_id: PlayerId,
    pub placement: Placement,
    pub points: i64,
    pub before: SkillEstimate,
    pub after: SkillEstimate,
}

impl GameParticipant {
    /// Change in displayed rating caused by this game
    pub fn rating_change(&self) -> i64 {
        self.after.display_rating() - self.before.display_rating()
    }
}

/// A committed game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub played_at: DateTime<Utc>,
    pub participants: Vec<GameParticipant>,
}

impl GameRecord {
    pub fn num_players(&self) -> usize {
        self.participants.len()
    }

    pub fn participant(&self, player_id: PlayerId) -> Option<&GameParticipant> {
        self.participants.iter().find(|p| p.player_id == player_id)
    }
}

/// One game from a single player's point of view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerGameEntry {
    pub game_id: GameId,
    pub played_at: DateTime<Utc>,
    pub placement: Placement,
    pub points: i64,
    pub rating_change: i64,
    pub num_players: usize,
}
