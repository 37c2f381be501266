//! Metrics collection using Prometheus
//!
//! Counters and histograms for the game-processing pipeline. Everything is
//! registered on a private registry so several pipelines (or tests) can run in
//! one process without name clashes.

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the rating service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Submission outcomes
    submission_metrics: SubmissionMetrics,

    /// Player registry metrics
    player_metrics: PlayerMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// How submitted games ended up
#[derive(Clone)]
pub struct SubmissionMetrics {
    /// Games submitted, by outcome (committed, rejected, conflict, failed)
    pub submissions_total: IntCounterVec,

    /// Rejected submissions by reason
    pub rejections_total: IntCounterVec,

    /// Commits that found a participant changed and had to retry
    pub commit_conflicts_total: IntCounter,

    /// Players per committed game
    pub game_size: Histogram,
}

/// Player registry metrics
#[derive(Clone)]
pub struct PlayerMetrics {
    /// Players registered through the pipeline
    pub players_registered_total: IntCounter,

    /// Players removed through the pipeline
    pub players_removed_total: IntCounter,

    /// Players known to the store at last count
    pub players_known: IntGauge,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Rating model time per game
    pub rating_calculation_duration: Histogram,

    /// Store commit time per attempt
    pub commit_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let submission_metrics = SubmissionMetrics::new(&registry)?;
        let player_metrics = PlayerMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            submission_metrics,
            player_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn submissions(&self) -> &SubmissionMetrics {
        &self.submission_metrics
    }

    pub fn players(&self) -> &PlayerMetrics {
        &self.player_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record a game that made it into the store
    pub fn record_game_committed(&self, num_players: usize) {
        self.submission_metrics
            .submissions_total
            .with_label_values(&["committed"])
            .inc();
        self.submission_metrics
            .game_size
            .observe(num_players as f64);
    }

    /// Record a submission refused before anything was written
    pub fn record_rejection(&self, reason: &str) {
        self.submission_metrics
            .submissions_total
            .with_label_values(&["rejected"])
            .inc();
        self.submission_metrics
            .rejections_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a submission that gave up after repeated commit conflicts
    pub fn record_conflict_exhausted(&self) {
        self.submission_metrics
            .submissions_total
            .with_label_values(&["conflict"])
            .inc();
    }

    /// Record a submission that failed for any other reason
    pub fn record_failure(&self) {
        self.submission_metrics
            .submissions_total
            .with_label_values(&["failed"])
            .inc();
    }

    /// Record one stale commit attempt
    pub fn record_commit_conflict(&self) {
        self.submission_metrics.commit_conflicts_total.inc();
    }

    pub fn record_player_registered(&self) {
        self.player_metrics.players_registered_total.inc();
        self.player_metrics.players_known.inc();
    }

    pub fn record_player_removed(&self) {
        self.player_metrics.players_removed_total.inc();
        self.player_metrics.players_known.dec();
    }

    pub fn set_players_known(&self, count: usize) {
        self.player_metrics.players_known.set(count as i64);
    }

    /// Record rating calculation duration
    pub fn record_rating_calculation(&self, duration: Duration) {
        self.performance_metrics
            .rating_calculation_duration
            .observe(duration.as_secs_f64());
    }

    /// Record one commit attempt's duration
    pub fn record_commit(&self, duration: Duration) {
        self.performance_metrics
            .commit_duration
            .observe(duration.as_secs_f64());
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }

    /// Render every registered metric in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl SubmissionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let submissions_total = IntCounterVec::new(
            Opts::new(
                "splendor_ratings_submissions_total",
                "Game submissions by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(submissions_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "splendor_ratings_rejections_total",
                "Rejected game submissions by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let commit_conflicts_total = IntCounter::new(
            "splendor_ratings_commit_conflicts_total",
            "Game commits retried because a participant changed",
        )?;
        registry.register(Box::new(commit_conflicts_total.clone()))?;

        let game_size = Histogram::with_opts(
            HistogramOpts::new("splendor_ratings_game_size", "Players per committed game")
                .buckets(vec![2.0, 3.0, 4.0, 6.0, 8.0]),
        )?;
        registry.register(Box::new(game_size.clone()))?;

        Ok(Self {
            submissions_total,
            rejections_total,
            commit_conflicts_total,
            game_size,
        })
    }
}

impl PlayerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_registered_total = IntCounter::new(
            "splendor_ratings_players_registered_total",
            "Players registered",
        )?;
        registry.register(Box::new(players_registered_total.clone()))?;

        let players_removed_total = IntCounter::new(
            "splendor_ratings_players_removed_total",
            "Players removed",
        )?;
        registry.register(Box::new(players_removed_total.clone()))?;

        let players_known =
            IntGauge::new("splendor_ratings_players_known", "Players in the store")?;
        registry.register(Box::new(players_known.clone()))?;

        Ok(Self {
            players_registered_total,
            players_removed_total,
            players_known,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let rating_calculation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "splendor_ratings_rating_calculation_duration_seconds",
                "Rating calculation time",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05]),
        )?;
        registry.register(Box::new(rating_calculation_duration.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "splendor_ratings_commit_duration_seconds",
                "Game commit time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            rating_calculation_duration,
            commit_duration,
        })
    }
}
