use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::OutputFormat;
use runstore::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Write a default config file
    Init {
        /// Where to write it (defaults to the platform config dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!(
                            "database_path: {}",
                            config.database_path.value.display()
                        );
                        println!("  source: {}", config.database_path.source);
                        println!(
                            "store.busy_timeout_ms: {}",
                            config.store.busy_timeout_ms.value
                        );
                        println!("  source: {}", config.store.busy_timeout_ms.source);
                        println!("store.swap_strategy: {}", config.store.swap_strategy.value);
                        println!("  source: {}", config.store.swap_strategy.source);
                        println!("sync.failure_policy: {}", config.sync.failure_policy.value);
                        println!("  source: {}", config.sync.failure_policy.source);
                        println!(
                            "sync.drain_interval_secs: {}",
                            config.sync.drain_interval_secs.value
                        );
                        println!("  source: {}", config.sync.drain_interval_secs.source);
                    }
                }
                Ok(())
            }
            ConfigSubcommand::Init { path } => {
                let path = path.clone().unwrap_or_else(Config::default_config_path);
                Config::write_default(&path)?;
                println!("Wrote {}", path.display());
                Ok(())
            }
        }
    }
}
