//! Spot Trader - stop-limit / take-profit engine for crypto spot markets
//!
//! # WARNING
//! - This tool trades with real money on a live exchange account.
//! - Market orders fill at whatever price the book offers.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use spot_trader::cli::commands;
use spot_trader::config::Config;

/// Spot Trader - automated spot trading helper
#[derive(Parser)]
#[command(name = "trader")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "TRADER_CONFIG", default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one tick per scheduler interval until interrupted
    Run,

    /// Run a single tick
    Tick,

    /// Request a buy, executed once the price trends up
    Buy {
        /// Coin name, e.g. BTC
        coin: String,
    },

    /// Request a sell of a held coin
    Sell {
        coin: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Keep a coin from being sold at its limits
    Hold {
        coin: String,

        /// Release the hold instead
        #[arg(long)]
        release: bool,
    },

    /// Cancel a pending buy or sell request
    Cancel { coin: String },

    /// Stop tracking a sold coin
    Drop { coin: String },

    /// Show tracked coins
    Trades,

    /// Show the survivor ranking
    Scores,

    /// Reset all survivor scores
    ResetScores {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Show realized profit
    Stats,

    /// Show current configuration (secrets masked)
    Config,

    /// Check price feed, exchange account and store
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing, LOG_FORMAT=json for machine-readable output
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("spot_trader=info".parse()?);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration loaded from {}", cli.config);

    // Execute command
    let result = match cli.command {
        Commands::Run => commands::run(&config).await,
        Commands::Tick => commands::tick(&config).await,
        Commands::Buy { coin } => commands::buy(&config, &coin),
        Commands::Sell { coin, force } => commands::sell(&config, &coin, force).await,
        Commands::Hold { coin, release } => commands::hold(&config, &coin, release),
        Commands::Cancel { coin } => commands::cancel(&config, &coin),
        Commands::Drop { coin } => commands::drop(&config, &coin),
        Commands::Trades => commands::trades(&config),
        Commands::Scores => commands::scores(&config),
        Commands::ResetScores { force } => commands::reset_scores(&config, force),
        Commands::Stats => commands::stats(&config),
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
