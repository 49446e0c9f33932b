//! Schema model: the entities, attributes and relationships a store holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::ErrorClass;
use crate::value::Value;

/// Errors loading or validating a schema document.
///
/// Bundled schemas ship with the binary, so any of these indicates a
/// packaging defect rather than a runtime condition.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to parse schema document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Schema {version}: {reason}")]
    Invalid { version: String, reason: String },
}

impl SchemaError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Configuration
    }

    fn invalid(version: &str, reason: impl Into<String>) -> Self {
        SchemaError::Invalid {
            version: version.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Uuid,
    String,
    Integer,
    Double,
    Boolean,
    Date,
    Binary,
}

impl AttributeType {
    /// Declared SQLite column type.
    pub fn sql_type(&self) -> &'static str {
        match self {
            AttributeType::Uuid | AttributeType::String | AttributeType::Date => "TEXT",
            AttributeType::Integer | AttributeType::Boolean => "INTEGER",
            AttributeType::Double => "REAL",
            AttributeType::Binary => "BLOB",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Uuid => write!(f, "uuid"),
            AttributeType::String => write!(f, "string"),
            AttributeType::Integer => write!(f, "integer"),
            AttributeType::Double => write!(f, "double"),
            AttributeType::Boolean => write!(f, "boolean"),
            AttributeType::Date => write!(f, "date"),
            AttributeType::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for AttributeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uuid" => Ok(AttributeType::Uuid),
            "string" => Ok(AttributeType::String),
            "integer" => Ok(AttributeType::Integer),
            "double" => Ok(AttributeType::Double),
            "boolean" => Ok(AttributeType::Boolean),
            "date" => Ok(AttributeType::Date),
            "binary" => Ok(AttributeType::Binary),
            _ => Err(format!("Invalid attribute type '{}'", s)),
        }
    }
}

/// Literal assigned to an attribute that has no source during migration.
///
/// Written as a plain YAML scalar. On a `date` attribute the string `now`
/// stands for the migration timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

pub const DEFAULT_NOW: &str = "now";

impl DefaultValue {
    /// The value this default produces for an attribute of `kind`, or `None`
    /// if the literal does not fit that type.
    pub fn resolve(&self, kind: AttributeType, now: DateTime<Utc>) -> Option<Value> {
        match (self, kind) {
            (DefaultValue::String(s), AttributeType::Date) if s == DEFAULT_NOW => {
                Some(Value::Date(now))
            }
            (DefaultValue::String(s), AttributeType::String) => Some(Value::String(s.clone())),
            (DefaultValue::Integer(i), AttributeType::Integer) => Some(Value::Integer(*i)),
            (DefaultValue::Integer(i), AttributeType::Double) => Some(Value::Double(*i as f64)),
            (DefaultValue::Double(d), AttributeType::Double) => Some(Value::Double(*d)),
            (DefaultValue::Boolean(b), AttributeType::Boolean) => Some(Value::Boolean(*b)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    pub destination: String,
    #[serde(default)]
    pub to_many: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub table: String,
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl EntityDef {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn create_table_sql(&self) -> String {
        let columns: Vec<String> = self
            .attributes
            .iter()
            .map(|a| {
                if a.name == "id" {
                    format!("id {} PRIMARY KEY NOT NULL", a.kind.sql_type())
                } else if a.optional {
                    format!("{} {}", a.name, a.kind.sql_type())
                } else {
                    format!("{} {} NOT NULL", a.name, a.kind.sql_type())
                }
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            columns.join(", ")
        )
    }

    pub fn insert_sql(&self) -> String {
        let columns = self.column_names();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders
        )
    }
}

/// A complete schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaModel {
    pub version: String,
    pub entities: Vec<EntityDef>,
}

impl SchemaModel {
    /// Parses and validates a YAML schema document.
    pub fn from_yaml(source: &str) -> Result<Self, SchemaError> {
        let model: SchemaModel = serde_yaml::from_str(source)?;
        model.validate()?;
        Ok(model)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Structural fingerprint of this schema.
    ///
    /// Covers entity and table names, attribute names, types and optionality,
    /// and relationships. The version label and attribute defaults are not
    /// part of the structure and do not affect the signature.
    pub fn signature(&self) -> String {
        let mut entities: Vec<&EntityDef> = self.entities.iter().collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));

        let mut hasher = Sha256::new();
        for entity in entities {
            hasher.update(format!("entity {} table {}\n", entity.name, entity.table));

            let mut attributes: Vec<&AttributeDef> = entity.attributes.iter().collect();
            attributes.sort_by(|a, b| a.name.cmp(&b.name));
            for a in attributes {
                let optional = if a.optional { "?" } else { "" };
                hasher.update(format!("  attr {}:{}{}\n", a.name, a.kind, optional));
            }

            let mut relationships: Vec<&RelationshipDef> = entity.relationships.iter().collect();
            relationships.sort_by(|a, b| a.name.cmp(&b.name));
            for r in relationships {
                let many = if r.to_many { "[]" } else { "" };
                hasher.update(format!("  rel {}->{}{}\n", r.name, r.destination, many));
            }
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn create_statements(&self) -> Vec<String> {
        self.entities.iter().map(EntityDef::create_table_sql).collect()
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let version = self.version.as_str();
        if version.trim().is_empty() {
            return Err(SchemaError::invalid("<unnamed>", "version must not be empty"));
        }

        let mut names = HashSet::new();
        let mut tables = HashSet::new();
        for entity in &self.entities {
            if !names.insert(entity.name.as_str()) {
                return Err(SchemaError::invalid(
                    version,
                    format!("duplicate entity {}", entity.name),
                ));
            }
            if !is_identifier(&entity.table) || !tables.insert(entity.table.as_str()) {
                return Err(SchemaError::invalid(
                    version,
                    format!("invalid or duplicate table name '{}'", entity.table),
                ));
            }

            match entity.attribute("id") {
                Some(id) if id.kind == AttributeType::Uuid && !id.optional => {}
                _ => {
                    return Err(SchemaError::invalid(
                        version,
                        format!("{} needs a required uuid 'id' attribute", entity.name),
                    ))
                }
            }

            let mut attributes = HashSet::new();
            for a in &entity.attributes {
                if !is_identifier(&a.name) || !attributes.insert(a.name.as_str()) {
                    return Err(SchemaError::invalid(
                        version,
                        format!("invalid or duplicate attribute {}.{}", entity.name, a.name),
                    ));
                }
                if let Some(default) = &a.default {
                    if default.resolve(a.kind, Utc::now()).is_none() {
                        return Err(SchemaError::invalid(
                            version,
                            format!("default of {}.{} is not a {}", entity.name, a.name, a.kind),
                        ));
                    }
                }
            }
        }

        for entity in &self.entities {
            for r in &entity.relationships {
                if self.entity(&r.destination).is_none() {
                    return Err(SchemaError::invalid(
                        version,
                        format!(
                            "relationship {}.{} points at unknown entity {}",
                            entity.name, r.name, r.destination
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Lowercase SQL identifier; table and column names are interpolated into SQL.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
version: "1"
entities:
  - name: User
    table: users
    attributes:
      - { name: id, type: uuid }
      - { name: username, type: string }
      - { name: created_at, type: date, default: now }
"#;

    #[test]
    fn test_parse_minimal_schema() {
        let model = SchemaModel::from_yaml(MINIMAL).unwrap();
        assert_eq!(model.version, "1");
        let user = model.entity("User").unwrap();
        assert_eq!(
            user.attribute("created_at").unwrap().default,
            Some(DefaultValue::String(DEFAULT_NOW.to_string()))
        );
    }

    #[test]
    fn test_signature_ignores_version_and_defaults() {
        let a = SchemaModel::from_yaml(MINIMAL).unwrap();
        let b = SchemaModel::from_yaml(
            &MINIMAL
                .replace("version: \"1\"", "version: \"7\"")
                .replace(", default: now", ""),
        )
        .unwrap();
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_changes_with_structure() {
        let a = SchemaModel::from_yaml(MINIMAL).unwrap();
        let b = SchemaModel::from_yaml(&MINIMAL.replace("type: string", "type: integer")).unwrap();
        let c = SchemaModel::from_yaml(
            &MINIMAL.replace("{ name: username, type: string }", "{ name: username, type: string, optional: true }"),
        )
        .unwrap();
        assert_ne!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
        assert_eq!(a.signature().len(), 64);
    }

    #[test]
    fn test_signature_independent_of_declaration_order() {
        let reordered = r#"
version: "1"
entities:
  - name: User
    table: users
    attributes:
      - { name: created_at, type: date }
      - { name: username, type: string }
      - { name: id, type: uuid }
"#;
        let a = SchemaModel::from_yaml(MINIMAL).unwrap();
        let b = SchemaModel::from_yaml(reordered).unwrap();
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_default_resolution() {
        let now = Utc::now();
        let default = DefaultValue::String(DEFAULT_NOW.to_string());
        assert_eq!(default.resolve(AttributeType::Date, now), Some(Value::Date(now)));
        assert_eq!(
            default.resolve(AttributeType::String, now),
            Some(Value::String("now".to_string()))
        );
        assert_eq!(
            DefaultValue::Integer(2).resolve(AttributeType::Double, now),
            Some(Value::Double(2.0))
        );
        assert_eq!(DefaultValue::Boolean(true).resolve(AttributeType::Integer, now), None);
    }

    #[test]
    fn test_missing_id_rejected() {
        let source = MINIMAL.replace("{ name: id, type: uuid }", "{ name: id, type: string }");
        let err = SchemaModel::from_yaml(&source).unwrap_err();
        assert!(err.to_string().contains("uuid 'id'"));
    }

    #[test]
    fn test_default_type_mismatch_rejected() {
        let source = MINIMAL.replace("type: date, default: now", "type: integer, default: now");
        assert!(SchemaModel::from_yaml(&source).is_err());
    }

    #[test]
    fn test_unsafe_table_name_rejected() {
        let source = MINIMAL.replace("table: users", "table: \"users; DROP TABLE x\"");
        assert!(SchemaModel::from_yaml(&source).is_err());
    }

    #[test]
    fn test_create_table_sql() {
        let model = SchemaModel::from_yaml(MINIMAL).unwrap();
        assert_eq!(
            model.entity("User").unwrap().create_table_sql(),
            "CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY NOT NULL, username TEXT NOT NULL, created_at TEXT NOT NULL)"
        );
    }
}
