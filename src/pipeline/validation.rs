//! Submission checks that need no store access

use crate::config::PipelineSettings;
use crate::error::{RatingError, Result};
use crate::types::{ParticipantResult, Placement};
use std::collections::HashSet;

/// Reject a game whose shape is wrong before anything is read or written
pub fn validate_submission(results: &[ParticipantResult], policy: &PipelineSettings) -> Result<()> {
    if results.len() < policy.min_participants || results.len() > policy.max_participants {
        return Err(invalid(format!(
            "Expected {} to {} participants, got {}",
            policy.min_participants,
            policy.max_participants,
            results.len()
        )));
    }

    let mut seen = HashSet::with_capacity(results.len());
    if let Some(duplicate) = results.iter().find(|r| !seen.insert(r.player_id)) {
        return Err(invalid(format!(
            "Player {} appears more than once",
            duplicate.player_id
        )));
    }

    let placements: Vec<Placement> = results.iter().map(|r| r.placement).collect();
    validate_placements(&placements)
}

/// Placements must read like a finishing order
///
/// Sorted ascending, the first placement is 1 and each new value is at most
/// one more than the number of players ahead of it. Both standard (`1,1,3`)
/// and dense (`1,1,2`) tie numbering pass; gaps such as `1,3` do not.
pub fn validate_placements(placements: &[Placement]) -> Result<()> {
    let mut sorted = placements.to_vec();
    sorted.sort_unstable();

    match sorted.first() {
        None => return Err(invalid("No placements given".to_string())),
        Some(&first) if first != 1 => {
            return Err(invalid(format!("Best placement must be 1, got {}", first)));
        }
        Some(_) => {}
    }

    for (ahead, pair) in sorted.windows(2).enumerate() {
        let (previous, current) = (pair[0], pair[1]);
        if current != previous && current as usize > ahead + 2 {
            return Err(invalid(format!(
                "Placement {} skips past {} player(s) ahead of it",
                current,
                ahead + 1
            )));
        }
    }

    Ok(())
}

fn invalid(reason: String) -> anyhow::Error {
    RatingError::InvalidSubmission { reason }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_player_id;

    fn results(placements: &[Placement]) -> Vec<ParticipantResult> {
        placements
            .iter()
            .map(|&placement| ParticipantResult {
                player_id: generate_player_id(),
                placement,
                points: 10,
            })
            .collect()
    }

    fn is_invalid(result: Result<()>) -> bool {
        match result {
            Err(e) => matches!(
                RatingError::find(&e),
                Some(RatingError::InvalidSubmission { .. })
            ),
            Ok(()) => false,
        }
    }

    #[test]
    fn test_accepts_finishing_orders() {
        for placements in [
            vec![1, 2],
            vec![2, 1],
            vec![1, 1],
            vec![1, 2, 3, 4],
            vec![3, 1, 4, 2],
            vec![1, 1, 3],
            vec![1, 1, 2],
            vec![1, 2, 2, 4],
            vec![1, 1, 1, 1],
        ] {
            assert!(
                validate_placements(&placements).is_ok(),
                "{:?} should be accepted",
                placements
            );
        }
    }

    #[test]
    fn test_rejects_malformed_orders() {
        for placements in [
            vec![],
            vec![0, 1],
            vec![2, 2],
            vec![1, 3],
            vec![1, 1, 4],
            vec![1, 2, 5, 3],
        ] {
            assert!(
                is_invalid(validate_placements(&placements)),
                "{:?} should be rejected",
                placements
            );
        }
    }

    #[test]
    fn test_participant_count_bounds() {
        let policy = PipelineSettings::default();

        assert!(is_invalid(validate_submission(&results(&[1]), &policy)));
        assert!(validate_submission(&results(&[1, 2]), &policy).is_ok());
        assert!(validate_submission(&results(&[1, 2, 3, 4]), &policy).is_ok());
        assert!(is_invalid(validate_submission(
            &results(&[1, 2, 3, 4, 5]),
            &policy
        )));

        let wide = PipelineSettings {
            max_participants: 6,
            ..PipelineSettings::default()
        };
        assert!(validate_submission(&results(&[1, 2, 3, 4, 5]), &wide).is_ok());
    }

    #[test]
    fn test_duplicate_player_rejected() {
        let mut game = results(&[1, 2, 3]);
        game[2].player_id = game[0].player_id;

        assert!(is_invalid(validate_submission(
            &game,
            &PipelineSettings::default()
        )));
    }
}
