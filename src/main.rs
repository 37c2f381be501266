//! Command-line entry point for the Splendor rating service
//!
//! Every command opens the configured database, runs one operation through
//! the pipeline or the read-only views and prints the result as JSON.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use splendor_ratings::config::AppConfig;
use splendor_ratings::leaderboard::{self, DEFAULT_PROFILE_GAMES, DEFAULT_RECENT_GAMES};
use splendor_ratings::service::AppState;
use splendor_ratings::types::{ParticipantResult, PlayerId};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info};

/// Splendor Ratings - Plackett-Luce skill ratings for Splendor games
#[derive(Parser)]
#[command(
    name = "splendor-ratings",
    version,
    about = "Skill ratings for multiplayer Splendor games",
    long_about = "Splendor Ratings records finished games with their placements and points, \
                 keeps a Plackett-Luce skill estimate for every player and ranks them on a \
                 leaderboard."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Database URL override
    #[arg(long, value_name = "URL", help = "Override SQLite database URL")]
    database_url: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(long, help = "Validate configuration and exit without touching the database")]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new player at the initial rating
    AddPlayer { name: String },

    /// Remove a player who has not played any games
    RemovePlayer { id: PlayerId },

    /// Submit a finished game
    Submit {
        /// JSON array of {player_id, placement, points}; "-" reads stdin
        #[arg(value_name = "FILE|-")]
        input: String,
    },

    /// Show every player ranked by rating
    Leaderboard,

    /// Show one player with their recent games
    Player {
        id: PlayerId,
        #[arg(long, default_value_t = DEFAULT_PROFILE_GAMES)]
        recent: usize,
    },

    /// Show the most recent games
    Games {
        #[arg(long, default_value_t = DEFAULT_RECENT_GAMES)]
        limit: usize,
    },

    /// Win chances for a game that has not been played yet
    Preview {
        #[arg(required = true, num_args = 2..)]
        ids: Vec<PlayerId>,
    },
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(database_url) = &args.database_url {
        config.storage.database_url = database_url.clone();
    }

    splendor_ratings::config::validate_config(&config)?;
    Ok(config)
}

fn display_config(config: &AppConfig) {
    info!("Splendor Ratings {}", splendor_ratings::VERSION);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Database: {}", config.storage.database_url);
    info!(
        "   Participants per game: {}..={}",
        config.pipeline.min_participants, config.pipeline.max_participants
    );
    info!(
        "   Initial rating: {} +/- {:.1}",
        config.rating.initial_mean, config.rating.initial_uncertainty
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_submission(input: &str) -> Result<Vec<ParticipantResult>> {
    let raw = if input == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("Failed to read game from stdin")?;
        buffer
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read game file {}", input))?
    };

    serde_json::from_str(&raw).context("Game must be a JSON array of {player_id, placement, points}")
}

async fn run(command: Command, state: &AppState) -> Result<()> {
    let store = state.store();

    match command {
        Command::AddPlayer { name } => {
            let player = state.processor().register_player(&name).await?;
            print_json(&leaderboard::PlayerSummary::from(&player))
        }
        Command::RemovePlayer { id } => {
            state.processor().remove_player(id).await?;
            print_json(&serde_json::json!({ "removed": id }))
        }
        Command::Submit { input } => {
            let results = read_submission(&input).await?;
            let game = state.processor().submit_game(results).await?;
            debug!("Metrics after submission:\n{}", state.metrics().gather_text()?);
            print_json(&game)
        }
        Command::Leaderboard => print_json(&leaderboard::leaderboard(store.as_ref()).await?),
        Command::Player { id, recent } => {
            print_json(&leaderboard::player_profile(store.as_ref(), id, recent).await?)
        }
        Command::Games { limit } => {
            print_json(&leaderboard::recent_games(store.as_ref(), limit).await?)
        }
        Command::Preview { ids } => print_json(&state.processor().preview(&ids).await?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_config(&config);

    if args.dry_run {
        info!("Dry run completed - configuration is valid");
        return Ok(());
    }

    let Some(command) = args.command else {
        error!("No command given; see --help");
        std::process::exit(2);
    };

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = run(command, &state).await;
    state.shutdown();

    if let Err(e) = outcome {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
