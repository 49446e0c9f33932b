use clap::{Args, Subcommand};

use super::OutputFormat;
use runstore::config::Config;
use runstore::store::{Store, StoreLocation};

/// Inspect the offline sync queue
#[derive(Args)]
pub struct QueueCommand {
    #[command(subcommand)]
    pub command: QueueSubcommand,
}

#[derive(Subcommand)]
pub enum QueueSubcommand {
    /// List pending mutations, oldest first
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl QueueCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let location = StoreLocation::new(&config.database_path.value);
        let store = Store::open_existing(location, &config.store_options()).await?;
        let result = self.list(&store).await;
        store.close().await?;
        result
    }

    async fn list(&self, store: &Store) -> Result<(), Box<dyn std::error::Error>> {
        let QueueSubcommand::List { format } = &self.command;
        let entries = store.sync_queue().entries().await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
            OutputFormat::Text => {
                if entries.is_empty() {
                    println!("No pending mutations.");
                    return Ok(());
                }
                for entry in &entries {
                    println!(
                        "{}  {:<6} {:<10} {}  ({} bytes)",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S%.6f"),
                        entry.operation.to_string(),
                        entry.item_type.to_string(),
                        entry.item_id,
                        entry.payload.len()
                    );
                }
                println!("\n{} pending", entries.len());
            }
        }
        Ok(())
    }
}
