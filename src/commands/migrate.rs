use clap::Args;

use runstore::config::Config;
use runstore::migration::{
    MappingModel, MappingRule, MigrationEngine, MigrationError, MigrationOutcome,
    TransformRegistry,
};
use runstore::schema::{SchemaCatalog, StoreStatus, VersionDetector};
use runstore::store::StoreLocation;

/// Migrate the store to the current schema
#[derive(Args)]
pub struct MigrateCommand {
    /// Print the mapping that would be applied without changing anything
    #[arg(long)]
    plan: bool,
}

impl MigrateCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let catalog = SchemaCatalog::bundled();
        let registry = TransformRegistry::bundled();
        let location = StoreLocation::new(&config.database_path.value);
        let options = config.store_options();

        if self.plan {
            return print_plan(catalog, &registry, &location, options.busy_timeout).await;
        }

        let engine = MigrationEngine::new(catalog, &registry)
            .with_swap_strategy(options.swap_strategy)
            .with_busy_timeout(options.busy_timeout);

        match engine.migrate_if_needed(&location).await? {
            MigrationOutcome::NoStore => {
                println!("No store at {}", location.path().display())
            }
            MigrationOutcome::UpToDate => println!(
                "Store is already at schema {}",
                catalog.current().version
            ),
            MigrationOutcome::Migrated { from, to, records } => {
                println!(
                    "Migrated {} record(s) from schema {} to {}",
                    records, from, to
                )
            }
        }
        Ok(())
    }
}

async fn print_plan(
    catalog: &SchemaCatalog,
    registry: &TransformRegistry,
    location: &StoreLocation,
    busy_timeout: std::time::Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let detector = VersionDetector::new(catalog).with_busy_timeout(busy_timeout);
    let stored = match detector.status(location).await? {
        StoreStatus::Outdated(stored) => stored,
        _ => {
            println!("Nothing to migrate.");
            return Ok(());
        }
    };

    let source = catalog
        .find_by_signature(&stored.schema_signature)
        .ok_or_else(|| MigrationError::MappingModelNotFound {
            signature: stored.schema_signature.clone(),
            version: stored.schema_version.clone(),
        })?;
    let model = MappingModel::resolve(source, catalog.current(), registry)?;

    println!(
        "Schema {} -> {}",
        model.source_version, model.destination_version
    );
    for entity in &model.entities {
        let rule = match entity.rule {
            MappingRule::Automatic => "automatic",
            MappingRule::Custom(_) => "custom",
        };
        println!(
            "\n{} -> {} ({})",
            entity.source_entity, entity.destination_entity, rule
        );
        println!("  copy: {}", entity.copies.join(", "));
        for (name, _, default) in &entity.defaults {
            println!("  default: {} = {:?}", name, default);
        }
        for name in &entity.nulls {
            println!("  null: {}", name);
        }
    }
    Ok(())
}
