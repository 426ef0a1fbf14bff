use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courtnews_core::{storage::Database, AppConfig};

mod commands;

#[derive(Parser)]
#[command(name = "courtnews")]
#[command(author, version, about = "News ingestion service for the court portal")]
struct Cli {
    /// Configuration file (defaults to $COURTNEWS_CONFIG or ~/.config/courtnews/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the daily refresh (default)
    Serve,
    /// Fetch news once and exit
    Refresh,
    /// Print the news the API would serve
    List {
        /// Number of items to show
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Show store and schedule status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let config = Arc::new(config);

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let db = Database::new(&config).await?;

    match cli.command {
        Some(Commands::Serve) | None => commands::serve::run(db, config).await,
        Some(Commands::Refresh) => commands::refresh::run(db, &config).await,
        Some(Commands::List { limit }) => commands::list::run(db, &config, limit).await,
        Some(Commands::Status) => commands::status::run(db, &config).await,
    }
}
