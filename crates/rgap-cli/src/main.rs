//! RGAP CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::search::SearchArgs;

#[derive(Parser)]
#[command(name = "rgap")]
#[command(about = "Research grant analytics CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "RGAP_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Path to the system configuration file
    #[arg(long, env = "RGAP_CONFIG", default_value = "rgap.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Delete expired login sessions
    PurgeSessions,
    /// Validate the system configuration
    CheckConfig,
    /// Search grants through the API server
    Search(SearchArgs),
    /// Show a grant and its amendment history
    Grant {
        /// Grant ID
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate => {
            commands::migrate(&cli.config).await?;
        }
        Commands::PurgeSessions => {
            commands::purge_sessions(&cli.config).await?;
        }
        Commands::CheckConfig => {
            commands::check_config(&cli.config)?;
        }
        Commands::Search(args) => {
            commands::search::search(&cli.api_url, &args).await?;
        }
        Commands::Grant { id } => {
            commands::search::grant(&cli.api_url, id).await?;
        }
    }

    Ok(())
}
