//! SQLite-backed rating storage
//!
//! Players carry a `version` column. A game commit runs in one transaction
//! that bumps each participant's version only if it still matches the version
//! the rating was computed from; any miss rolls the whole game back.

use crate::error::{RatingError, Result};
use crate::storage::{GameCommit, RatingStore};
use crate::types::{
    GameParticipant, GameRecord, Player, PlayerAggregate, PlayerGameEntry, PlayerId,
    SkillEstimate, PLACEMENT_BUCKETS,
};
use crate::utils::{current_timestamp, generate_player_id};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS players (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        mu REAL NOT NULL,
        sigma REAL NOT NULL,
        games_played INTEGER NOT NULL DEFAULT 0,
        first_place INTEGER NOT NULL DEFAULT 0,
        second_place INTEGER NOT NULL DEFAULT 0,
        third_place INTEGER NOT NULL DEFAULT 0,
        fourth_place INTEGER NOT NULL DEFAULT 0,
        total_points INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS games (
        id TEXT PRIMARY KEY,
        played_at TEXT NOT NULL,
        num_players INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS game_participants (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        game_id TEXT NOT NULL REFERENCES games(id),
        player_id TEXT NOT NULL REFERENCES players(id),
        placement INTEGER NOT NULL,
        points INTEGER NOT NULL,
        mu_before REAL NOT NULL,
        sigma_before REAL NOT NULL,
        mu_after REAL NOT NULL,
        sigma_after REAL NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_games_played_at ON games(played_at)",
    "CREATE INDEX IF NOT EXISTS idx_participants_game ON game_participants(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_participants_player ON game_participants(player_id)",
];

const PLAYER_COLUMNS: &str = "id, name, mu, sigma, games_played, first_place, second_place, \
     third_place, fourth_place, total_points, version, created_at";

/// Rating storage on a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteRatingStore {
    pool: Pool<Sqlite>,
}

impl SqliteRatingStore {
    /// Open (creating if missing) the database at `database_url` and apply the schema
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        if database_url.contains(":memory:") {
            return Self::in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        info!("Connected to rating database at {}", database_url);
        Self::from_pool(pool).await
    }

    /// Private in-memory database, kept on a single connection so it outlives idle periods
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, applying the schema
    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        debug!("Rating schema ready");
        Ok(())
    }

    async fn load_participants(&self, game_id: Uuid) -> Result<Vec<GameParticipant>> {
        let rows = sqlx::query(
            r#"
            SELECT player_id, placement, points, mu_before, sigma_before, mu_after, sigma_after
            FROM game_participants
            WHERE game_id = ?
            ORDER BY id
            "#,
        )
        .bind(game_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(participant_from_row).collect()
    }

    /// One transaction: version-guarded player updates, then the game rows
    async fn apply_commit(&self, commit: GameCommit) -> Result<GameRecord> {
        let mut tx = self.pool.begin().await?;

        for update in &commit.updates {
            let aggregate = &update.aggregate;
            let result = sqlx::query(
                r#"
                UPDATE players
                SET mu = ?, sigma = ?, games_played = ?,
                    first_place = ?, second_place = ?, third_place = ?, fourth_place = ?,
                    total_points = ?, version = version + 1
                WHERE id = ? AND version = ?
                "#,
            )
            .bind(update.estimate.mean)
            .bind(update.estimate.uncertainty)
            .bind(aggregate.games_played as i64)
            .bind(aggregate.placements[0] as i64)
            .bind(aggregate.placements[1] as i64)
            .bind(aggregate.placements[2] as i64)
            .bind(aggregate.placements[3] as i64)
            .bind(aggregate.total_points)
            .bind(update.player_id.to_string())
            .bind(update.expected_version as i64)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                warn!(
                    player_id = %update.player_id,
                    expected_version = update.expected_version,
                    "Player changed under a pending game commit"
                );
                return Err(RatingError::StaleSnapshot {
                    player_id: update.player_id,
                }
                .into());
            }
        }

        let game = commit.game;
        sqlx::query("INSERT INTO games (id, played_at, num_players) VALUES (?, ?, ?)")
            .bind(game.id.to_string())
            .bind(encode_timestamp(&game.played_at))
            .bind(game.num_players() as i64)
            .execute(&mut *tx)
            .await?;

        for participant in &game.participants {
            sqlx::query(
                r#"
                INSERT INTO game_participants
                    (game_id, player_id, placement, points,
                     mu_before, sigma_before, mu_after, sigma_after)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(game.id.to_string())
            .bind(participant.player_id.to_string())
            .bind(participant.placement as i64)
            .bind(participant.points)
            .bind(participant.before.mean)
            .bind(participant.before.uncertainty)
            .bind(participant.after.mean)
            .bind(participant.after.uncertainty)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(game_id = %game.id, "Committed game to database");
        Ok(game)
    }
}

/// SQLITE_BUSY or SQLITE_LOCKED, including their extended codes
fn is_contention(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| RatingError::StorageError {
            message: format!("Bad timestamp '{}': {}", raw, e),
        })?
        .with_timezone(&Utc))
}

fn decode_id(raw: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(raw).map_err(|e| RatingError::StorageError {
        message: format!("Bad id '{}': {}", raw, e),
    })?)
}

fn player_from_row(row: &SqliteRow) -> Result<Player> {
    let mut placements = [0u64; PLACEMENT_BUCKETS];
    for (bucket, column) in placements.iter_mut().zip([
        "first_place",
        "second_place",
        "third_place",
        "fourth_place",
    ]) {
        *bucket = row.try_get::<i64, _>(column)? as u64;
    }

    Ok(Player {
        id: decode_id(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        estimate: SkillEstimate::new(row.try_get("mu")?, row.try_get("sigma")?),
        aggregate: PlayerAggregate {
            games_played: row.try_get::<i64, _>("games_played")? as u64,
            placements,
            total_points: row.try_get("total_points")?,
        },
        version: row.try_get::<i64, _>("version")? as u64,
        created_at: decode_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn participant_from_row(row: &SqliteRow) -> Result<GameParticipant> {
    Ok(GameParticipant {
        player_id: decode_id(&row.try_get::<String, _>("player_id")?)?,
        placement: row.try_get::<i64, _>("placement")? as u32,
        points: row.try_get("points")?,
        before: SkillEstimate::new(row.try_get("mu_before")?, row.try_get("sigma_before")?),
        after: SkillEstimate::new(row.try_get("mu_after")?, row.try_get("sigma_after")?),
    })
}

#[async_trait]
impl RatingStore for SqliteRatingStore {
    async fn create_player(&self, name: &str, initial: SkillEstimate) -> Result<Player> {
        let player = Player {
            id: generate_player_id(),
            name: name.to_string(),
            estimate: initial,
            aggregate: PlayerAggregate::default(),
            version: 0,
            created_at: current_timestamp(),
        };

        let inserted = sqlx::query(
            "INSERT INTO players (id, name, mu, sigma, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(player.id.to_string())
        .bind(&player.name)
        .bind(player.estimate.mean)
        .bind(player.estimate.uncertainty)
        .bind(encode_timestamp(&player.created_at))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(player),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RatingError::DuplicatePlayer {
                    name: name.to_string(),
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_player(&self, player_id: PlayerId) -> Result<Option<Player>> {
        let row = sqlx::query(&format!("SELECT {} FROM players WHERE id = ?", PLAYER_COLUMNS))
            .bind(player_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(player_from_row).transpose()
    }

    async fn snapshot(&self, player_ids: &[PlayerId]) -> Result<HashMap<PlayerId, Player>> {
        if player_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; player_ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM players WHERE id IN ({})",
            PLAYER_COLUMNS, placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in player_ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| player_from_row(row).map(|p| (p.id, p)))
            .collect()
    }

    async fn commit_game(&self, commit: GameCommit) -> Result<GameRecord> {
        self.apply_commit(commit).await.map_err(|e| {
            let busy = e
                .downcast_ref::<sqlx::Error>()
                .filter(|db_error| is_contention(db_error))
                .map(ToString::to_string);
            match busy {
                Some(message) => {
                    warn!("Database busy during game commit: {}", message);
                    RatingError::StoreBusy { message }.into()
                }
                None => e,
            }
        })
    }

    async fn list_players(&self) -> Result<Vec<Player>> {
        let rows = sqlx::query(&format!("SELECT {} FROM players ORDER BY name", PLAYER_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(player_from_row).collect()
    }

    async fn remove_player(&self, player_id: PlayerId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM players WHERE id = ? AND games_played = 0")
            .bind(player_id.to_string())
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM players WHERE id = ?)")
            .bind(player_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        if exists {
            return Err(RatingError::PlayerHasHistory { player_id }.into());
        }
        Ok(false)
    }

    async fn recent_games(&self, limit: usize) -> Result<Vec<GameRecord>> {
        let rows = sqlx::query(
            "SELECT id, played_at FROM games ORDER BY played_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut games = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = decode_id(&row.try_get::<String, _>("id")?)?;
            games.push(GameRecord {
                id,
                played_at: decode_timestamp(&row.try_get::<String, _>("played_at")?)?,
                participants: self.load_participants(id).await?,
            });
        }
        Ok(games)
    }

    async fn player_history(&self, player_id: PlayerId, limit: usize) -> Result<Vec<PlayerGameEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.played_at, g.num_players, gp.placement, gp.points,
                   gp.mu_before, gp.mu_after
            FROM game_participants gp
            JOIN games g ON g.id = gp.game_id
            WHERE gp.player_id = ?
            ORDER BY g.played_at DESC, g.rowid DESC
            LIMIT ?
            "#,
        )
        .bind(player_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let before = row.try_get::<f64, _>("mu_before")?.round() as i64;
                let after = row.try_get::<f64, _>("mu_after")?.round() as i64;
                Ok(PlayerGameEntry {
                    game_id: decode_id(&row.try_get::<String, _>("id")?)?,
                    played_at: decode_timestamp(&row.try_get::<String, _>("played_at")?)?,
                    placement: row.try_get::<i64, _>("placement")? as u32,
                    points: row.try_get("points")?,
                    rating_change: after - before,
                    num_players: row.try_get::<i64, _>("num_players")? as usize,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PlayerUpdate;
    use crate::utils::generate_game_id;
    use std::time::Duration;

    fn initial() -> SkillEstimate {
        SkillEstimate::new(1000.0, 333.0)
    }

    fn commit_for(players: &[&Player]) -> GameCommit {
        let mut participants = Vec::new();
        let mut updates = Vec::new();
        for (index, player) in players.iter().enumerate() {
            let placement = index as u32 + 1;
            let after = SkillEstimate::new(
                player.estimate.mean + 50.0 - 40.0 * index as f64,
                player.estimate.uncertainty - 10.0,
            );
            participants.push(GameParticipant {
                player_id: player.id,
                placement,
                points: 15 - index as i64,
                before: player.estimate,
                after,
            });
            updates.push(PlayerUpdate {
                player_id: player.id,
                expected_version: player.version,
                estimate: after,
                aggregate: player
                    .aggregate
                    .record_game(placement, 15 - index as i64)
                    .unwrap(),
            });
        }

        GameCommit {
            game: GameRecord {
                id: generate_game_id(),
                played_at: current_timestamp(),
                participants,
            },
            updates,
        }
    }

    #[tokio::test]
    async fn test_player_round_trip() {
        let store = SqliteRatingStore::in_memory().await.unwrap();
        let created = store.create_player("Alice", initial()).await.unwrap();

        let fetched = store.get_player(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name, "Alice");
        assert_eq!(fetched.estimate, initial());
        assert_eq!(fetched.aggregate, PlayerAggregate::default());
        assert_eq!(fetched.version, 0);

        assert!(store
            .get_player(generate_player_id())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = SqliteRatingStore::in_memory().await.unwrap();
        store.create_player("Alice", initial()).await.unwrap();

        let error = store.create_player("Alice", initial()).await.unwrap_err();
        assert!(matches!(
            RatingError::find(&error),
            Some(RatingError::DuplicatePlayer { .. })
        ));
    }

    #[tokio::test]
    async fn test_commit_persists_game_and_players() {
        let store = SqliteRatingStore::in_memory().await.unwrap();
        let alice = store.create_player("Alice", initial()).await.unwrap();
        let bob = store.create_player("Bob", initial()).await.unwrap();
        let carol = store.create_player("Carol", initial()).await.unwrap();

        let commit = commit_for(&[&bob, &alice, &carol]);
        let game = store.commit_game(commit).await.unwrap();

        let snapshot = store.snapshot(&[alice.id, bob.id, carol.id]).await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[&bob.id].aggregate.first_places(), 1);
        assert_eq!(snapshot[&alice.id].aggregate.placements[1], 1);
        assert_eq!(snapshot[&carol.id].aggregate.total_points, 13);
        assert_eq!(snapshot[&carol.id].version, 1);
        assert_eq!(snapshot[&bob.id].estimate.mean, 1050.0);

        let games = store.recent_games(5).await.unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].id, game.id);
        assert_eq!(games[0].participants, game.participants);

        let history = store.player_history(carol.id, 5).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].placement, 3);
        assert_eq!(history[0].rating_change, -30);
        assert_eq!(history[0].num_players, 3);
    }

    #[tokio::test]
    async fn test_stale_commit_rolls_back() {
        let store = SqliteRatingStore::in_memory().await.unwrap();
        let alice = store.create_player("Alice", initial()).await.unwrap();
        let bob = store.create_player("Bob", initial()).await.unwrap();

        let first = commit_for(&[&alice, &bob]);
        let stale = commit_for(&[&bob, &alice]);
        store.commit_game(first).await.unwrap();

        let error = store.commit_game(stale).await.unwrap_err();
        assert!(matches!(
            RatingError::find(&error),
            Some(RatingError::StaleSnapshot { .. })
        ));

        assert_eq!(store.recent_games(10).await.unwrap().len(), 1);
        let bob = store.get_player(bob.id).await.unwrap().unwrap();
        assert_eq!(bob.version, 1);
        assert_eq!(bob.aggregate.games_played, 1);
        assert_eq!(bob.aggregate.placements[1], 1);
    }

    #[tokio::test]
    async fn test_locked_database_commit_is_transient() {
        let path = std::env::temp_dir().join(format!("splendor-ratings-{}.db", Uuid::new_v4()));
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .busy_timeout(Duration::ZERO);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        let store = SqliteRatingStore::from_pool(pool.clone()).await.unwrap();
        let alice = store.create_player("Alice", initial()).await.unwrap();
        let bob = store.create_player("Bob", initial()).await.unwrap();

        // Another writer holds the database lock
        let mut writer = pool.acquire().await.unwrap();
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *writer)
            .await
            .unwrap();

        let error = store
            .commit_game(commit_for(&[&alice, &bob]))
            .await
            .unwrap_err();
        let busy = RatingError::find(&error).unwrap();
        assert!(matches!(busy, RatingError::StoreBusy { .. }));
        assert!(busy.is_retryable_commit());

        sqlx::query("ROLLBACK").execute(&mut *writer).await.unwrap();
        drop(writer);

        assert!(store.recent_games(10).await.unwrap().is_empty());
        store
            .commit_game(commit_for(&[&alice, &bob]))
            .await
            .unwrap();
        assert_eq!(store.get_player(alice.id).await.unwrap().unwrap().version, 1);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_remove_player() {
        let store = SqliteRatingStore::in_memory().await.unwrap();
        let alice = store.create_player("Alice", initial()).await.unwrap();
        let bob = store.create_player("Bob", initial()).await.unwrap();
        let carol = store.create_player("Carol", initial()).await.unwrap();
        store.commit_game(commit_for(&[&alice, &bob])).await.unwrap();

        assert!(store.remove_player(carol.id).await.unwrap());
        assert!(!store.remove_player(carol.id).await.unwrap());

        let error = store.remove_player(bob.id).await.unwrap_err();
        assert!(matches!(
            RatingError::find(&error),
            Some(RatingError::PlayerHasHistory { .. })
        ));

        let names: Vec<String> = store
            .list_players()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[tokio::test]
    async fn test_recent_games_limit_and_order() {
        let store = SqliteRatingStore::in_memory().await.unwrap();
        let mut alice = store.create_player("Alice", initial()).await.unwrap();
        let mut bob = store.create_player("Bob", initial()).await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let game = store.commit_game(commit_for(&[&alice, &bob])).await.unwrap();
            ids.push(game.id);
            alice = store.get_player(alice.id).await.unwrap().unwrap();
            bob = store.get_player(bob.id).await.unwrap().unwrap();
        }

        let games = store.recent_games(2).await.unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].id, ids[2]);
        assert_eq!(games[1].id, ids[1]);

        let history = store.player_history(alice.id, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].game_id, ids[2]);
        assert_eq!(alice.aggregate.games_played, 3);
    }
}
