//! Plackett-Luce rating model
//!
//! Bayesian approximation of the Plackett-Luce ranking likelihood (Weng & Lin,
//! 2011). Each player is a Gaussian belief; one game's finishing order is
//! treated as a sequence of "who comes next among those still unplaced" draws.
//! Tied players split the credit for their mutual order evenly.

use crate::config::RatingConfig;
use crate::error::{RatingError, Result};
use crate::rating::calculator::RatingCalculator;
use crate::types::{RatedParticipant, SkillEstimate};

/// Plackett-Luce rating calculator
#[derive(Debug, Clone)]
pub struct PlackettLuceCalculator {
    config: RatingConfig,
}

/// Everyone placed no better than some participant, as a log-sum-exp pair
#[derive(Debug, Clone, Copy)]
struct Standing {
    /// Highest mean in the group, used as the exponent offset
    peak: f64,
    /// Sum of `exp((mean - peak) / c)` over the group
    total: f64,
}

impl Standing {
    fn share(&self, mean: f64, c: f64) -> f64 {
        ((mean - self.peak) / c).exp() / self.total
    }
}

impl PlackettLuceCalculator {
    /// Create a new Plackett-Luce calculator
    pub fn new(config: RatingConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self { config })
    }

    fn check_participants(participants: &[RatedParticipant]) -> Result<()> {
        if participants.len() < 2 {
            return Err(RatingError::InvalidSubmission {
                reason: format!(
                    "A game needs at least 2 participants, got {}",
                    participants.len()
                ),
            }
            .into());
        }

        if participants.iter().any(|p| p.placement == 0) {
            return Err(RatingError::InvalidSubmission {
                reason: "Placements start at 1".to_string(),
            }
            .into());
        }

        if let Some(bad) = participants.iter().find(|p| !p.estimate.is_well_formed()) {
            return Err(RatingError::NumericDegeneracy {
                reason: format!(
                    "Input estimate is not usable: mean {}, uncertainty {}",
                    bad.estimate.mean, bad.estimate.uncertainty
                ),
            }
            .into());
        }

        Ok(())
    }

    /// Shared scale of the game: sqrt of summed skill and performance variance
    fn scale(&self, variances: &[f64]) -> f64 {
        let beta_sq = self.config.beta.powi(2);
        variances.iter().map(|v| v + beta_sq).sum::<f64>().sqrt()
    }

    fn standing(participants: &[RatedParticipant], placement: u32, c: f64) -> Standing {
        let remaining = participants.iter().filter(|p| p.placement >= placement);
        let peak = remaining
            .clone()
            .map(|p| p.estimate.mean)
            .fold(f64::NEG_INFINITY, f64::max);
        let total = remaining.map(|p| ((p.estimate.mean - peak) / c).exp()).sum();

        Standing { peak, total }
    }
}

impl RatingCalculator for PlackettLuceCalculator {
    fn rate(&self, participants: &[RatedParticipant]) -> Result<Vec<SkillEstimate>> {
        Self::check_participants(participants)?;

        // Skill drift since the last game
        let tau_sq = self.config.tau.powi(2);
        let variances: Vec<f64> = participants
            .iter()
            .map(|p| p.estimate.uncertainty.powi(2) + tau_sq)
            .collect();
        let c = self.scale(&variances);

        let standings: Vec<Standing> = participants
            .iter()
            .map(|q| Self::standing(participants, q.placement, c))
            .collect();
        let tied: Vec<f64> = participants
            .iter()
            .map(|q| {
                participants
                    .iter()
                    .filter(|p| p.placement == q.placement)
                    .count() as f64
            })
            .collect();

        let mut updated = Vec::with_capacity(participants.len());
        for (i, player) in participants.iter().enumerate() {
            // omega: observed minus expected share of each draw the player took part in
            // delta: information gained from those draws
            let mut omega = 1.0 / tied[i];
            let mut delta = 0.0;
            for (q, rival) in participants.iter().enumerate() {
                if rival.placement > player.placement {
                    continue;
                }
                let share = standings[q].share(player.estimate.mean, c);
                omega -= share / tied[q];
                delta += share * (1.0 - share) / tied[q];
            }

            let variance = variances[i];
            let uncertainty = variance.sqrt();
            let max_shift = self.config.max_mean_shift * uncertainty;
            let shift = (variance / c * omega).clamp(-max_shift, max_shift);

            let gamma = uncertainty / c;
            let shrink = (1.0 - gamma * variance / c.powi(2) * delta).max(self.config.kappa);

            updated.push(SkillEstimate::new(
                player.estimate.mean + shift,
                (variance * shrink).sqrt(),
            ));
        }

        if let Some(bad) = updated.iter().find(|e| !e.is_well_formed()) {
            return Err(RatingError::NumericDegeneracy {
                reason: format!(
                    "Update produced mean {}, uncertainty {}",
                    bad.mean, bad.uncertainty
                ),
            }
            .into());
        }

        Ok(updated)
    }

    fn win_probabilities(&self, estimates: &[SkillEstimate]) -> Result<Vec<f64>> {
        if estimates.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = estimates.iter().find(|e| !e.is_well_formed()) {
            return Err(RatingError::NumericDegeneracy {
                reason: format!(
                    "Estimate is not usable: mean {}, uncertainty {}",
                    bad.mean, bad.uncertainty
                ),
            }
            .into());
        }

        let variances: Vec<f64> = estimates.iter().map(|e| e.uncertainty.powi(2)).collect();
        let c = self.scale(&variances);
        let peak = estimates
            .iter()
            .map(|e| e.mean)
            .fold(f64::NEG_INFINITY, f64::max);
        let strengths: Vec<f64> = estimates
            .iter()
            .map(|e| ((e.mean - peak) / c).exp())
            .collect();
        let total: f64 = strengths.iter().sum();

        Ok(strengths.into_iter().map(|s| s / total).collect())
    }

    fn initial_estimate(&self) -> SkillEstimate {
        self.config.initial_estimate()
    }

    fn config(&self) -> &RatingConfig {
        &self.config
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "plackett_luce",
            "config": self.config,
        })
    }
}
