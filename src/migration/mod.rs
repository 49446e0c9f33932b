//! Schema migration: mapping models, the migration engine and store swapping.

mod engine;
mod error;
mod mapping;
mod swap;

pub use engine::{MigrationEngine, MigrationOutcome, STAGING_SUFFIX};
pub use error::MigrationError;
pub use mapping::{
    upgrade_scheme, EntityMapping, MappingModel, MappingRule, Transform, TransformRegistry,
};
pub use swap::{replace_store, SwapStrategy};
