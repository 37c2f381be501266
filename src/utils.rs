//! Utility functions for the rating service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique player ID
pub fn generate_player_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique game ID
pub fn generate_game_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Round to the given number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_player_id();
        let id2 = generate_player_id();
        assert_ne!(id1, id2);

        let game_id1 = generate_game_id();
        let game_id2 = generate_game_id();
        assert_ne!(game_id1, game_id2);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.345, 1), 12.3);
        assert_eq!(round_to(2.0 / 3.0, 2), 0.67);
        assert_eq!(round_to(-1.25, 0), -1.0);
    }
}
