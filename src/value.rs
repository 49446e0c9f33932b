//! Schema-agnostic attribute values and records.
//!
//! A [`Record`] is one row of one entity, keyed by attribute name. The
//! migration engine works exclusively on records because historical schema
//! versions have no Rust struct; repositories convert between records and
//! typed entities through each entity's attribute table.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::StoreError;
use crate::schema::{AttributeType, EntityDef};

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Uuid(Uuid),
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value can be stored in an attribute of `kind`.
    /// `Null` matches every type; optionality is checked separately.
    pub fn matches(&self, kind: AttributeType) -> bool {
        matches!(
            (self, kind),
            (Value::Null, _)
                | (Value::Uuid(_), AttributeType::Uuid)
                | (Value::String(_), AttributeType::String)
                | (Value::Integer(_), AttributeType::Integer)
                | (Value::Double(_), AttributeType::Double)
                | (Value::Boolean(_), AttributeType::Boolean)
                | (Value::Date(_), AttributeType::Date)
                | (Value::Binary(_), AttributeType::Binary)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// `Some(None)` for null, `Some(Some(s))` for a string, `None` otherwise.
    pub fn as_optional_str(&self) -> Option<Option<&str>> {
        match self {
            Value::Null => Some(None),
            Value::String(s) => Some(Some(s)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Uuid(id) => write!(f, "{}", id),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Date(date) => write!(f, "{}", format_timestamp(*date)),
            Value::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Fixed-width RFC 3339 rendering used for every stored date, so that
/// lexicographic order in SQLite equals chronological order.
pub fn format_timestamp(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Current time. Dates are stored with nanosecond precision, so this
/// round-trips through the store unchanged.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// One row of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the value of `attribute`, or `Value::Null` if it was never set.
    pub fn get(&self, attribute: &str) -> &Value {
        self.values.get(attribute).unwrap_or(&Value::Null)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.values.contains_key(attribute)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: Value) {
        self.values.insert(attribute.into(), value);
    }

    pub fn with(mut self, attribute: impl Into<String>, value: Value) -> Self {
        self.set(attribute, value);
        self
    }

    pub fn id(&self) -> Option<Uuid> {
        self.get("id").as_uuid()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Decodes a row selected from `entity`'s table.
    pub fn from_row(entity: &EntityDef, row: &SqliteRow) -> Result<Self, StoreError> {
        decode_row(
            &entity.name,
            entity.attributes.iter().map(|a| (a.name.as_str(), a.kind)),
            row,
        )
    }

    /// Checks every attribute of `entity` against this record: types must
    /// match and required attributes must be non-null.
    pub fn validate(&self, entity: &EntityDef) -> Result<(), StoreError> {
        for attribute in &entity.attributes {
            let value = self.get(&attribute.name);
            if !value.matches(attribute.kind) || (value.is_null() && !attribute.optional) {
                return Err(StoreError::invalid_value(
                    &entity.name,
                    &attribute.name,
                    attribute.kind,
                ));
            }
        }
        Ok(())
    }
}

/// Decodes the named, typed columns of `row` into a record of `entity`.
pub fn decode_row<'a>(
    entity: &str,
    columns: impl IntoIterator<Item = (&'a str, AttributeType)>,
    row: &SqliteRow,
) -> Result<Record, StoreError> {
    let mut record = Record::new(entity);
    for (name, kind) in columns {
        let value = match kind {
            AttributeType::Uuid => match row.try_get::<Option<String>, _>(name)? {
                Some(raw) => Value::Uuid(
                    Uuid::parse_str(&raw)
                        .map_err(|_| StoreError::invalid_value(entity, name, kind))?,
                ),
                None => Value::Null,
            },
            AttributeType::String => row
                .try_get::<Option<String>, _>(name)?
                .map_or(Value::Null, Value::String),
            AttributeType::Integer => row
                .try_get::<Option<i64>, _>(name)?
                .map_or(Value::Null, Value::Integer),
            AttributeType::Double => row
                .try_get::<Option<f64>, _>(name)?
                .map_or(Value::Null, Value::Double),
            AttributeType::Boolean => row
                .try_get::<Option<bool>, _>(name)?
                .map_or(Value::Null, Value::Boolean),
            AttributeType::Date => match row.try_get::<Option<String>, _>(name)? {
                Some(raw) => Value::Date(
                    DateTime::parse_from_rfc3339(&raw)
                        .map_err(|_| StoreError::invalid_value(entity, name, kind))?
                        .with_timezone(&Utc),
                ),
                None => Value::Null,
            },
            AttributeType::Binary => row
                .try_get::<Option<Vec<u8>>, _>(name)?
                .map_or(Value::Null, Value::Binary),
        };
        record.set(name, value);
    }
    Ok(record)
}

/// Binds `value` as the next positional parameter of `query`.
pub fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Uuid(id) => query.bind(id.to_string()),
        Value::String(s) => query.bind(s.clone()),
        Value::Integer(i) => query.bind(*i),
        Value::Double(d) => query.bind(*d),
        Value::Boolean(b) => query.bind(*b),
        Value::Date(date) => query.bind(format_timestamp(*date)),
        Value::Binary(bytes) => query.bind(bytes.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_get_missing_is_null() {
        let record = Record::new("User").with("username", Value::String("ann".into()));
        assert_eq!(record.get("username").as_str(), Some("ann"));
        assert!(record.get("avatar_url").is_null());
        assert!(!record.contains("avatar_url"));
    }

    #[test]
    fn test_value_matches_type() {
        assert!(Value::Null.matches(AttributeType::Date));
        assert!(Value::Integer(3).matches(AttributeType::Integer));
        assert!(!Value::Integer(3).matches(AttributeType::Double));
        assert!(!Value::String("x".into()).matches(AttributeType::Uuid));
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::nanoseconds(1);
        assert_eq!(format_timestamp(a), "2026-01-02T03:04:05.000000000Z");
        assert_eq!(format_timestamp(a).len(), format_timestamp(b).len());
        assert!(format_timestamp(a) < format_timestamp(b));
    }

    #[test]
    fn test_now_survives_timestamp_roundtrip() {
        let stamp = Utc::now();
        let parsed = DateTime::parse_from_rfc3339(&format_timestamp(stamp))
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, stamp);
    }
}
