use clap::Args;
use serde::Serialize;

use super::OutputFormat;
use runstore::config::Config;
use runstore::schema::{SchemaCatalog, StoreStatus, VersionDetector};
use runstore::store::StoreLocation;

/// Show the store's schema version and whether it needs migrating
#[derive(Args)]
pub struct StatusCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Serialize)]
struct StatusReport {
    database_path: String,
    exists: bool,
    stored_version: Option<String>,
    stored_signature: Option<String>,
    current_version: String,
    current_signature: String,
    requires_migration: bool,
}

impl StatusCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let catalog = SchemaCatalog::bundled();
        let location = StoreLocation::new(&config.database_path.value);
        let detector = VersionDetector::new(catalog)
            .with_busy_timeout(config.store_options().busy_timeout);
        let status = detector.status(&location).await?;

        let stored = match &status {
            StoreStatus::Missing => None,
            StoreStatus::Current(stored) | StoreStatus::Outdated(stored) => Some(stored.clone()),
        };
        let report = StatusReport {
            database_path: location.path().display().to_string(),
            exists: !matches!(status, StoreStatus::Missing),
            stored_version: stored.as_ref().map(|s| s.schema_version.clone()),
            stored_signature: stored.map(|s| s.schema_signature),
            current_version: catalog.current().version.clone(),
            current_signature: catalog.current().signature(),
            requires_migration: status.requires_migration(),
        };

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => {
                println!("Store: {}", report.database_path);
                match &report.stored_version {
                    None => println!("  not created yet"),
                    Some(version) => println!("  schema version: {}", version),
                }
                println!("  current schema: {}", report.current_version);
                if report.requires_migration {
                    println!("\nMigration required. Run `runstore migrate`.");
                }
            }
        }
        Ok(())
    }
}
