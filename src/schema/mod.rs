mod catalog;
mod detector;
mod model;

pub use catalog::SchemaCatalog;
pub use detector::{current_schema_version, StoreStatus, VersionDetector};
pub use model::{
    AttributeDef, AttributeType, DefaultValue, EntityDef, RelationshipDef, SchemaError,
    SchemaModel, DEFAULT_NOW,
};
