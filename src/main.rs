use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ConfigCommand, MigrateCommand, QueueCommand, StatusCommand};
use runstore::config::Config;

#[derive(Parser)]
#[command(name = "runstore")]
#[command(version)]
#[command(about = "Inspect and migrate the local run store", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show schema status of the store
    Status(StatusCommand),

    /// Migrate the store to the current schema
    Migrate(MigrateCommand),

    /// Inspect the offline sync queue
    Queue(QueueCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Status(cmd)) => cmd.run(&config).await?,
        Some(Commands::Migrate(cmd)) => cmd.run(&config).await?,
        Some(Commands::Queue(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
