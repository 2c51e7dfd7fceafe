use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flaunch_core::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "flaunch")]
#[command(author, version, about = "Relay script engine streams from the daemon to the UI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Background daemon owning the backend connection
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Stream once from the backend and log every message
    Stream,
    /// Trigger streams through the running daemon and print their events
    Watch {
        /// Number of streams to trigger
        #[arg(short = 'c', long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the background daemon
    Start,
    /// Stop the background daemon
    Stop,
    /// Check daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Daemon { action } => match action {
            DaemonAction::Start => commands::daemon::start(config).await,
            DaemonAction::Stop => commands::daemon::stop().await,
            DaemonAction::Status => commands::daemon::status(&config).await,
        },
        Commands::Stream => commands::stream::run(&config).await,
        Commands::Watch { count } => commands::watch::run(&config, count).await,
    }
}
