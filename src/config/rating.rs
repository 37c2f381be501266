//! Rating model configuration
//!
//! These constants define the whole statistical behaviour of one rating
//! universe. Ratings computed under different values are not comparable.

use crate::error::{RatingError, Result};
use crate::types::SkillEstimate;
use serde::{Deserialize, Serialize};

/// Parameters of the Plackett-Luce rating model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Mean assigned to new players
    pub initial_mean: f64,
    /// Uncertainty (standard deviation) assigned to new players
    pub initial_uncertainty: f64,
    /// Performance noise between latent skill and one game's result
    pub beta: f64,
    /// Uncertainty added before every update (skill drift)
    pub tau: f64,
    /// Floor on the variance shrink factor; keeps uncertainty above zero
    pub kappa: f64,
    /// Largest mean change allowed in one game, in units of uncertainty
    pub max_mean_shift: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self::from_initial(1000.0, 1000.0 / 3.0)
    }
}

impl RatingConfig {
    /// Derive beta and tau from the initial belief the usual way
    /// (beta = sigma / 2, tau = sigma / 100)
    pub fn from_initial(initial_mean: f64, initial_uncertainty: f64) -> Self {
        Self {
            initial_mean,
            initial_uncertainty,
            beta: initial_uncertainty / 2.0,
            tau: initial_uncertainty / 100.0,
            kappa: 0.0001,
            max_mean_shift: 2.0,
        }
    }

    pub fn initial_estimate(&self) -> SkillEstimate {
        SkillEstimate::new(self.initial_mean, self.initial_uncertainty)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> anyhow::Error {
            RatingError::ConfigurationError {
                message: message.to_string(),
            }
            .into()
        };

        if !self.initial_mean.is_finite() {
            return Err(invalid("Initial mean must be finite"));
        }
        if !(self.initial_uncertainty.is_finite() && self.initial_uncertainty > 0.0) {
            return Err(invalid("Initial uncertainty must be positive"));
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(invalid("Beta must be positive"));
        }
        if !(self.tau.is_finite() && self.tau >= 0.0) {
            return Err(invalid("Tau must be non-negative"));
        }
        if !(self.kappa > 0.0 && self.kappa < 1.0) {
            return Err(invalid("Kappa must be in (0, 1)"));
        }
        if !(self.max_mean_shift.is_finite() && self.max_mean_shift > 0.0) {
            return Err(invalid("Max mean shift must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_splendor_constants() {
        let config = RatingConfig::default();
        assert_eq!(config.initial_mean, 1000.0);
        assert!((config.initial_uncertainty - 333.333).abs() < 0.001);
        assert!((config.beta - config.initial_uncertainty / 2.0).abs() < 1e-12);
        assert!((config.tau - config.initial_uncertainty / 100.0).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = RatingConfig::default();
        config.beta = 0.0;
        assert!(config.validate().is_err());

        config = RatingConfig::default();
        config.initial_uncertainty = -1.0;
        assert!(config.validate().is_err());

        config = RatingConfig::default();
        config.tau = f64::NAN;
        assert!(config.validate().is_err());

        config = RatingConfig::default();
        config.kappa = 0.0;
        assert!(config.validate().is_err());

        config = RatingConfig::default();
        config.max_mean_shift = 0.0;
        assert!(config.validate().is_err());

        // Zero drift is allowed
        config = RatingConfig::default();
        config.tau = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RatingConfig = toml::from_str("initial_mean = 1500.0").unwrap();
        assert_eq!(config.initial_mean, 1500.0);
        assert_eq!(config.kappa, 0.0001);
    }
}
