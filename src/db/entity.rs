use uuid::Uuid;

use crate::error::StoreError;
use crate::schema::AttributeType;
use crate::value::{Record, Value};

/// One persisted attribute of an entity: its column name and type, plus the
/// accessors that move it in and out of the struct.
pub struct Attribute<E> {
    pub name: &'static str,
    pub kind: AttributeType,
    pub optional: bool,
    pub get: fn(&E) -> Value,
    /// Returns `None` if the value has the wrong type for the field.
    pub set: fn(&mut E, &Value) -> Option<()>,
}

/// A typed struct stored in one table of the current schema.
pub trait Entity: Default + Clone + Send + Sync + 'static {
    /// Entity name in the schema.
    const NAME: &'static str;
    const TABLE: &'static str;

    /// Every persisted attribute, `id` included.
    fn attributes() -> &'static [Attribute<Self>];

    fn id(&self) -> Uuid;

    fn attribute(name: &str) -> Option<&'static Attribute<Self>> {
        Self::attributes().iter().find(|a| a.name == name)
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new(Self::NAME);
        for attribute in Self::attributes() {
            record.set(attribute.name, (attribute.get)(self));
        }
        record
    }

    fn from_record(record: &Record) -> Result<Self, StoreError> {
        let mut entity = Self::default();
        for attribute in Self::attributes() {
            let value = record.get(attribute.name);
            let accepted = !(value.is_null() && !attribute.optional)
                && (attribute.set)(&mut entity, value).is_some();
            if !accepted {
                return Err(StoreError::invalid_value(
                    Self::NAME,
                    attribute.name,
                    attribute.kind,
                ));
            }
        }
        Ok(entity)
    }
}
