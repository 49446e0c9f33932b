//! Store error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::schema::AttributeType;

/// Coarse classification of a failure.
///
/// Callers use it to decide what to do with an error: configuration defects
/// are never retried, I/O and storage failures are surfaced as-is, and
/// not-found is an ordinary outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Io,
    NotFound,
    Serialization,
    Storage,
}

/// Errors raised by the store context, repositories and the sync queue.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No store found at {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("Store at {} has no schema metadata", .0.display())]
    MissingMetadata(PathBuf),

    #[error("Store at {} must be migrated to schema {current} before use", .path.display())]
    MigrationRequired { path: PathBuf, current: String },

    #[error("Unknown attribute '{attribute}' on entity {entity}")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("Invalid value for {entity}.{attribute}: expected {expected}")]
    InvalidValue {
        entity: String,
        attribute: String,
        expected: AttributeType,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store context is closed")]
    Closed,
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_value(entity: &str, attribute: &str, expected: AttributeType) -> Self {
        StoreError::InvalidValue {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            expected,
        }
    }

    pub fn unknown_attribute(entity: &str, attribute: &str) -> Self {
        StoreError::UnknownAttribute {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::Io { .. } => ErrorClass::Io,
            StoreError::StoreNotFound(_) => ErrorClass::NotFound,
            StoreError::Serialization(_) | StoreError::InvalidValue { .. } => {
                ErrorClass::Serialization
            }
            StoreError::UnknownAttribute { .. } => ErrorClass::Configuration,
            StoreError::Database(_)
            | StoreError::MissingMetadata(_)
            | StoreError::MigrationRequired { .. }
            | StoreError::Closed => ErrorClass::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let err = StoreError::io(
            "/tmp/run.sqlite",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/run.sqlite"));
        assert_eq!(err.class(), ErrorClass::Io);
    }

    #[test]
    fn test_invalid_value_is_serialization_class() {
        let err = StoreError::invalid_value("User", "created_at", AttributeType::Date);
        assert_eq!(err.to_string(), "Invalid value for User.created_at: expected date");
        assert_eq!(err.class(), ErrorClass::Serialization);
    }
}
