//! Rating calculator trait and test double
//!
//! The pipeline only talks to [`RatingCalculator`], so the model behind it can
//! be swapped per rating universe or replaced in tests.

use crate::config::RatingConfig;
use crate::types::{RatedParticipant, SkillEstimate};
use std::sync::{Mutex, RwLock};

/// Trait for computing rating updates after games
pub trait RatingCalculator: Send + Sync {
    /// Revise every participant's estimate from one game's placements
    ///
    /// # Arguments
    /// * `participants` - current estimate and placement (1 = first) of each player
    ///
    /// # Returns
    /// One revised estimate per participant, in input order
    fn rate(&self, participants: &[RatedParticipant]) -> crate::error::Result<Vec<SkillEstimate>>;

    /// Probability that each player finishes first, in input order
    fn win_probabilities(&self, estimates: &[SkillEstimate]) -> crate::error::Result<Vec<f64>>;

    /// Get the initial estimate for new players
    fn initial_estimate(&self) -> SkillEstimate;

    /// Model parameters this calculator was built with
    fn config(&self) -> &RatingConfig;

    /// Get current configuration as JSON
    fn describe(&self) -> serde_json::Value;
}

/// Mock rating calculator for testing
#[derive(Debug, Default)]
pub struct MockRatingCalculator {
    calls: Mutex<Vec<Vec<RatedParticipant>>>,
    fixed_result: RwLock<Option<Vec<SkillEstimate>>>,
    config: RatingConfig,
}

impl MockRatingCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fixed result to return for all calculations
    pub fn set_fixed_result(&self, result: Vec<SkillEstimate>) {
        if let Ok(mut fixed) = self.fixed_result.write() {
            *fixed = Some(result);
        }
    }

    /// Get all calculation calls made (for testing)
    pub fn get_calculation_calls(&self) -> Vec<Vec<RatedParticipant>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl RatingCalculator for MockRatingCalculator {
    fn rate(&self, participants: &[RatedParticipant]) -> crate::error::Result<Vec<SkillEstimate>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(participants.to_vec());
        }

        if let Ok(fixed) = self.fixed_result.read() {
            if let Some(result) = fixed.as_ref() {
                return Ok(result.clone());
            }
        }

        // Default behavior: no rating change
        Ok(participants.iter().map(|p| p.estimate).collect())
    }

    fn win_probabilities(&self, estimates: &[SkillEstimate]) -> crate::error::Result<Vec<f64>> {
        let share = 1.0 / estimates.len().max(1) as f64;
        Ok(vec![share; estimates.len()])
    }

    fn initial_estimate(&self) -> SkillEstimate {
        self.config.initial_estimate()
    }

    fn config(&self) -> &RatingConfig {
        &self.config
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({ "type": "mock" })
    }
}
