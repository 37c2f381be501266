//! Skill rating model
//!
//! Pure, stateless rating computations. Nothing in here knows about players
//! as stored entities; it works on estimates and placements only.

pub mod calculator;
pub mod plackett_luce;

pub use calculator::{MockRatingCalculator, RatingCalculator};
pub use plackett_luce::PlackettLuceCalculator;
