use thiserror::Error;

use crate::error::{ErrorClass, StoreError};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("No mapping model for store schema {version} (signature {signature})")]
    MappingModelNotFound { signature: String, version: String },

    #[error("Cannot map {entity}.{attribute}: {reason}")]
    MappingInference {
        entity: String,
        attribute: String,
        reason: String,
    },

    #[error("Transform {from_entity} -> {to_entity} failed for record {record}: {reason}")]
    Transform {
        from_entity: String,
        to_entity: String,
        record: String,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for MigrationError {
    fn from(e: sqlx::Error) -> Self {
        MigrationError::Store(StoreError::Database(e))
    }
}

impl MigrationError {
    pub(crate) fn inference(entity: &str, attribute: &str, reason: impl Into<String>) -> Self {
        MigrationError::MappingInference {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            MigrationError::MappingModelNotFound { .. } | MigrationError::MappingInference { .. } => {
                ErrorClass::Configuration
            }
            MigrationError::Transform { .. } => ErrorClass::Serialization,
            MigrationError::Store(e) => e.class(),
        }
    }
}
