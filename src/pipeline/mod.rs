//! Game-processing pipeline
//!
//! Validates submitted results, rates them and commits the outcome atomically.

pub mod processor;
pub mod validation;

pub use processor::{GameProcessor, ProcessorStats, WinChance};
pub use validation::{validate_placements, validate_submission};
