use anyhow::Result;
use clap::{Parser, Subcommand};
use jaby_infrastructure::ConfigService;
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "jaby")]
#[command(about = "Jaby - per-user inference sessions over live connections", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-lines events from stdin, writing deliveries to stdout
    Run {
        /// User for lines that do not name one
        #[arg(long)]
        user: Option<String>,
        /// Display name for the default user
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the persisted facts of a user
    Facts {
        #[arg(long)]
        user: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_service = ConfigService::with_path(cli.config);
    let config = config_service.load()?;
    let _log_guard = logging::init_logging(&config.logging)?;

    match cli.command {
        Commands::Run { user, name } => commands::run::serve(&config, user, name).await?,
        Commands::Facts { user } => commands::facts::show(&config, &user).await?,
        Commands::Config => commands::config::show(&config_service, &config)?,
    }

    Ok(())
}
