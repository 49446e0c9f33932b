use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Attribute, Entity};
use crate::schema::AttributeType;
use crate::value::{self, Value};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            avatar_url: None,
            created_at: value::now(),
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

static ATTRIBUTES: [Attribute<User>; 4] = [
    Attribute {
        name: "id",
        kind: AttributeType::Uuid,
        optional: false,
        get: |u| Value::Uuid(u.id),
        set: |u, v| {
            u.id = v.as_uuid()?;
            Some(())
        },
    },
    Attribute {
        name: "username",
        kind: AttributeType::String,
        optional: false,
        get: |u| Value::String(u.username.clone()),
        set: |u, v| {
            u.username = v.as_str()?.to_string();
            Some(())
        },
    },
    Attribute {
        name: "avatar_url",
        kind: AttributeType::String,
        optional: true,
        get: |u| u.avatar_url.clone().map_or(Value::Null, Value::String),
        set: |u, v| {
            u.avatar_url = v.as_optional_str()?.map(str::to_string);
            Some(())
        },
    },
    Attribute {
        name: "created_at",
        kind: AttributeType::Date,
        optional: false,
        get: |u| Value::Date(u.created_at),
        set: |u, v| {
            u.created_at = v.as_date()?;
            Some(())
        },
    },
];

impl Entity for User {
    const NAME: &'static str = "User";
    const TABLE: &'static str = "users";

    fn attributes() -> &'static [Attribute<Self>] {
        &ATTRIBUTES
    }

    fn id(&self) -> Uuid {
        self.id
    }
}
