use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::{Attribute, Entity};
use crate::schema::AttributeType;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    #[default]
    Accepted,
    Blocked,
}

impl fmt::Display for FriendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FriendStatus::Pending => write!(f, "pending"),
            FriendStatus::Accepted => write!(f, "accepted"),
            FriendStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl FromStr for FriendStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(FriendStatus::Pending),
            "accepted" => Ok(FriendStatus::Accepted),
            "blocked" => Ok(FriendStatus::Blocked),
            _ => Err(format!(
                "Invalid friend status '{}'. Valid options: pending, accepted, blocked",
                s
            )),
        }
    }
}

/// A one-directional friendship from `user_id` to `friend_user_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Friend {
    pub id: Uuid,
    pub user_id: Uuid,
    pub friend_user_id: Uuid,
    pub status: FriendStatus,
}

impl Friend {
    /// A new, not yet accepted friend request.
    pub fn new(user_id: Uuid, friend_user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            friend_user_id,
            status: FriendStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: FriendStatus) -> Self {
        self.status = status;
        self
    }
}

static ATTRIBUTES: [Attribute<Friend>; 4] = [
    Attribute {
        name: "id",
        kind: AttributeType::Uuid,
        optional: false,
        get: |f| Value::Uuid(f.id),
        set: |f, v| {
            f.id = v.as_uuid()?;
            Some(())
        },
    },
    Attribute {
        name: "user_id",
        kind: AttributeType::Uuid,
        optional: false,
        get: |f| Value::Uuid(f.user_id),
        set: |f, v| {
            f.user_id = v.as_uuid()?;
            Some(())
        },
    },
    Attribute {
        name: "friend_user_id",
        kind: AttributeType::Uuid,
        optional: false,
        get: |f| Value::Uuid(f.friend_user_id),
        set: |f, v| {
            f.friend_user_id = v.as_uuid()?;
            Some(())
        },
    },
    Attribute {
        name: "status",
        kind: AttributeType::String,
        optional: false,
        get: |f| Value::String(f.status.to_string()),
        set: |f, v| {
            f.status = v.as_str()?.parse().ok()?;
            Some(())
        },
    },
];

impl Entity for Friend {
    const NAME: &'static str = "Friend";
    const TABLE: &'static str = "friends";

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

    #[test]
    fn test_friend_new_is_pending() {
        let friend = Friend::new(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(friend.status, FriendStatus::Pending);
    }

    #[test]
    fn test_friend_status_from_str() {
        assert_eq!(FriendStatus::from_str("Accepted").unwrap(), FriendStatus::Accepted);
        assert_eq!(FriendStatus::from_str("blocked").unwrap(), FriendStatus::Blocked);
        assert!(FriendStatus::from_str("ignored").is_err());
    }

    #[test]
    fn test_friend_record_roundtrip() {
        let friend = Friend::new(Uuid::new_v4(), Uuid::new_v4()).with_status(FriendStatus::Blocked);
        let record = friend.to_record();
        assert_eq!(record.get("status").as_str(), Some("blocked"));
        assert_eq!(Friend::from_record(&record).unwrap(), friend);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let record = Friend::new(Uuid::new_v4(), Uuid::new_v4())
            .to_record()
            .with("status", Value::String("ignored".into()));
        assert!(Friend::from_record(&record).is_err());
    }
}
