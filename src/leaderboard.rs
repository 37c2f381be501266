//! Read-only views over the store
//!
//! Ranking, player profiles and the game log. Nothing here writes.

use crate::error::{RatingError, Result};
use crate::storage::RatingStore;
use crate::types::{GameId, GameRecord, Placement, Player, PlayerGameEntry, PlayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Games shown on a profile unless asked otherwise
pub const DEFAULT_PROFILE_GAMES: usize = 15;

/// Games shown in the game log unless asked otherwise
pub const DEFAULT_RECENT_GAMES: usize = 20;

/// A player's public numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub rating: i64,
    pub uncertainty: i64,
    pub games_played: u64,
    pub first_place: u64,
    pub second_place: u64,
    pub third_place: u64,
    pub fourth_place: u64,
    pub total_points: i64,
    pub average_points: f64,
    pub win_rate: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        let aggregate = &player.aggregate;
        Self {
            id: player.id,
            name: player.name.clone(),
            rating: player.rating(),
            uncertainty: player.estimate.uncertainty.round() as i64,
            games_played: aggregate.games_played,
            first_place: aggregate.placements[0],
            second_place: aggregate.placements[1],
            third_place: aggregate.placements[2],
            fourth_place: aggregate.placements[3],
            total_points: aggregate.total_points,
            average_points: aggregate.average_points(),
            win_rate: aggregate.win_rate(),
            created_at: player.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub player: PlayerSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    #[serde(flatten)]
    pub player: PlayerSummary,
    pub recent_games: Vec<PlayerGameEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub id: GameId,
    pub played_at: DateTime<Utc>,
    pub num_players: usize,
    /// Best placement first
    pub participants: Vec<ParticipantSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub player_id: PlayerId,
    pub player_name: String,
    pub placement: Placement,
    pub points: i64,
    pub rating_before: i64,
    pub rating_after: i64,
    pub rating_change: i64,
}

/// Every player, highest displayed rating first; equal ratings ordered by name
pub async fn leaderboard(store: &dyn RatingStore) -> Result<Vec<LeaderboardEntry>> {
    let mut players = store.list_players().await?;
    players.sort_by(|a, b| b.rating().cmp(&a.rating()).then_with(|| a.name.cmp(&b.name)));

    Ok(players
        .iter()
        .enumerate()
        .map(|(index, player)| LeaderboardEntry {
            rank: index + 1,
            player: PlayerSummary::from(player),
        })
        .collect())
}

pub async fn player_profile(
    store: &dyn RatingStore,
    player_id: PlayerId,
    recent: usize,
) -> Result<PlayerProfile> {
    let player = store
        .get_player(player_id)
        .await?
        .ok_or(RatingError::PlayerNotFound { player_id })?;
    let recent_games = store.player_history(player_id, recent).await?;

    Ok(PlayerProfile {
        player: PlayerSummary::from(&player),
        recent_games,
    })
}

/// Newest games first
pub async fn recent_games(store: &dyn RatingStore, limit: usize) -> Result<Vec<GameSummary>> {
    let games = store.recent_games(limit).await?;
    let names: HashMap<PlayerId, String> = store
        .list_players()
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    Ok(games.iter().map(|game| summarize(game, &names)).collect())
}

fn summarize(game: &GameRecord, names: &HashMap<PlayerId, String>) -> GameSummary {
    let mut participants: Vec<ParticipantSummary> = game
        .participants
        .iter()
        .map(|p| ParticipantSummary {
            player_id: p.player_id,
            player_name: names
                .get(&p.player_id)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            placement: p.placement,
            points: p.points,
            rating_before: p.before.display_rating(),
            rating_after: p.after.display_rating(),
            rating_change: p.rating_change(),
        })
        .collect();
    participants.sort_by_key(|p| p.placement);

    GameSummary {
        id: game.id,
        played_at: game.played_at,
        num_players: game.num_players(),
        participants,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GameCommit, InMemoryRatingStore, PlayerUpdate};
    use crate::types::{GameParticipant, SkillEstimate};
    use crate::utils::{current_timestamp, generate_game_id, generate_player_id};

    async fn seeded() -> (InMemoryRatingStore, Vec<Player>) {
        let store = InMemoryRatingStore::new();
        let mut players = Vec::new();
        for (name, mean) in [("Dana", 1000.0), ("Bea", 1200.2), ("Cole", 999.6), ("Abe", 1000.3)] {
            let player = store
                .create_player(name, SkillEstimate::new(mean, 333.3))
                .await
                .unwrap();
            players.push(player);
        }
        (store, players)
    }

    #[tokio::test]
    async fn test_leaderboard_order() {
        let (store, _) = seeded().await;
        let board = leaderboard(&store).await.unwrap();

        let names: Vec<&str> = board.iter().map(|e| e.player.name.as_str()).collect();
        // Abe, Cole and Dana all display 1000
        assert_eq!(names, vec!["Bea", "Abe", "Cole", "Dana"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].player.rating, 1200);
        assert_eq!(board[0].player.uncertainty, 333);
        assert_eq!(board[3].rank, 4);
    }

    #[tokio::test]
    async fn test_profile_and_game_log() {
        let (store, players) = seeded().await;
        let (winner, loser) = (&players[0], &players[1]);
        let won = SkillEstimate::new(1040.0, 320.0);
        let lost = SkillEstimate::new(1170.0, 320.0);

        store
            .commit_game(GameCommit {
                game: GameRecord {
                    id: generate_game_id(),
                    played_at: current_timestamp(),
                    participants: vec![
                        GameParticipant {
                            player_id: loser.id,
                            placement: 2,
                            points: 11,
                            before: loser.estimate,
                            after: lost,
                        },
                        GameParticipant {
                            player_id: winner.id,
                            placement: 1,
                            points: 16,
                            before: winner.estimate,
                            after: won,
                        },
                    ],
                },
                updates: vec![
                    PlayerUpdate {
                        player_id: loser.id,
                        expected_version: 0,
                        estimate: lost,
                        aggregate: loser.aggregate.record_game(2, 11).unwrap(),
                    },
                    PlayerUpdate {
                        player_id: winner.id,
                        expected_version: 0,
                        estimate: won,
                        aggregate: winner.aggregate.record_game(1, 16).unwrap(),
                    },
                ],
            })
            .await
            .unwrap();

        let profile = player_profile(&store, winner.id, DEFAULT_PROFILE_GAMES)
            .await
            .unwrap();
        assert_eq!(profile.player.games_played, 1);
        assert_eq!(profile.player.win_rate, 100.0);
        assert_eq!(profile.player.average_points, 16.0);
        assert_eq!(profile.recent_games.len(), 1);
        assert_eq!(profile.recent_games[0].rating_change, 40);

        let log = recent_games(&store, DEFAULT_RECENT_GAMES).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].num_players, 2);
        assert_eq!(log[0].participants[0].player_name, "Dana");
        assert_eq!(log[0].participants[0].placement, 1);
        assert_eq!(log[0].participants[1].rating_change, -30);
    }

    #[tokio::test]
    async fn test_unknown_profile() {
        let (store, _) = seeded().await;
        let error = player_profile(&store, generate_player_id(), 5)
            .await
            .unwrap_err();
        assert!(matches!(
            RatingError::find(&error),
            Some(RatingError::PlayerNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_summary_serializes_flat() {
        let (store, _) = seeded().await;
        let board = leaderboard(&store).await.unwrap();
        let json = serde_json::to_value(&board[0]).unwrap();

        assert_eq!(json["rank"], 1);
        assert_eq!(json["name"], "Bea");
        assert_eq!(json["games_played"], 0);
    }
}
