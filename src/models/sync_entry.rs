use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item_type::{ItemType, Operation};
use crate::db::{Attribute, Entity};
use crate::schema::AttributeType;
use crate::value::Value;

/// A mutation waiting to be delivered to the remote service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: Uuid,
    /// Id of the record the mutation applies to.
    pub item_id: Uuid,
    pub item_type: ItemType,
    pub operation: Operation,
    pub created_at: DateTime<Utc>,
    /// Serialized record, opaque to the queue.
    pub payload: Vec<u8>,
}

static ATTRIBUTES: [Attribute<SyncQueueEntry>; 6] = [
    Attribute {
        name: "id",
        kind: AttributeType::Uuid,
        optional: false,
        get: |e| Value::Uuid(e.id),
        set: |e, v| {
            e.id = v.as_uuid()?;
            Some(())
        },
    },
    Attribute {
        name: "item_id",
        kind: AttributeType::Uuid,
        optional: false,
        get: |e| Value::Uuid(e.item_id),
        set: |e, v| {
            e.item_id = v.as_uuid()?;
            Some(())
        },
    },
    Attribute {
        name: "item_type",
        kind: AttributeType::String,
        optional: false,
        get: |e| Value::String(e.item_type.to_string()),
        set: |e, v| {
            e.item_type = v.as_str()?.parse().ok()?;
            Some(())
        },
    },
    Attribute {
        name: "operation",
        kind: AttributeType::String,
        optional: false,
        get: |e| Value::String(e.operation.to_string()),
        set: |e, v| {
            e.operation = v.as_str()?.parse().ok()?;
            Some(())
        },
    },
    Attribute {
        name: "created_at",
        kind: AttributeType::Date,
        optional: false,
        get: |e| Value::Date(e.created_at),
        set: |e, v| {
            e.created_at = v.as_date()?;
            Some(())
        },
    },
    Attribute {
        name: "payload",
        kind: AttributeType::Binary,
        optional: false,
        get: |e| Value::Binary(e.payload.clone()),
        set: |e, v| {
            e.payload = v.as_bytes()?.to_vec();
            Some(())
        },
    },
];

impl Entity for SyncQueueEntry {
    const NAME: &'static str = "SyncQueueEntry";
    const TABLE: &'static str = "sync_queue";

    fn attributes() -> &'static [Attribute<Self>] {
        &ATTRIBUTES
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;

    #[test]
    fn test_entry_record_stores_wire_names() {
        let entry = SyncQueueEntry {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            item_type: ItemType::RunSession,
            operation: Operation::Delete,
            created_at: value::now(),
            payload: b"{}".to_vec(),
        };
        let record = entry.to_record();
        assert_eq!(record.get("item_type").as_str(), Some("runSession"));
        assert_eq!(record.get("operation").as_str(), Some("delete"));
        assert_eq!(SyncQueueEntry::from_record(&record).unwrap(), entry);
    }
}
