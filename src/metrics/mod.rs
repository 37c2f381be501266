//! Metrics for the rating service

pub mod collector;

pub use collector::{
    MetricsCollector, MetricsTimer, PerformanceMetrics, PlayerMetrics, SubmissionMetrics,
};
