use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of record a queued mutation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    #[default]
    User,
    RunSession,
    Friend,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::User => write!(f, "user"),
            ItemType::RunSession => write!(f, "runSession"),
            ItemType::Friend => write!(f, "friend"),
        }
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ItemType::User),
            "runsession" | "run_session" => Ok(ItemType::RunSession),
            "friend" => Ok(ItemType::Friend),
            _ => Err(format!(
                "Invalid item type '{}'. Valid options: user, runSession, friend",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(format!(
                "Invalid operation '{}'. Valid options: create, update, delete",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_display() {
        assert_eq!(format!("{}", ItemType::User), "user");
        assert_eq!(format!("{}", ItemType::RunSession), "runSession");
        assert_eq!(format!("{}", ItemType::Friend), "friend");
    }

    #[test]
    fn test_item_type_from_str() {
        assert_eq!(ItemType::from_str("runSession").unwrap(), ItemType::RunSession);
        assert_eq!(ItemType::from_str("USER").unwrap(), ItemType::User);
        assert!(ItemType::from_str("workout").is_err());
    }

    #[test]
    fn test_item_type_display_parses_back() {
        for item_type in [ItemType::User, ItemType::RunSession, ItemType::Friend] {
            assert_eq!(item_type.to_string().parse::<ItemType>().unwrap(), item_type);
        }
    }

    #[test]
    fn test_item_type_json_matches_display() {
        let json = serde_json::to_string(&ItemType::RunSession).unwrap();
        assert_eq!(json, "\"runSession\"");
    }

    #[test]
    fn test_operation_from_str() {
        assert_eq!(Operation::from_str("Create").unwrap(), Operation::Create);
        assert_eq!(Operation::from_str("update").unwrap(), Operation::Update);
        assert_eq!(Operation::from_str("delete").unwrap(), Operation::Delete);
        assert!(Operation::from_str("upsert").is_err());
        assert!(Operation::from_str("").is_err());
    }
}
