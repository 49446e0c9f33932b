use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Attribute, Entity};
use crate::schema::AttributeType;
use crate::value::Value;

/// One recorded run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub distance_meters: f64,
    pub duration_s: i64,
    pub route_url: Option<String>,
}

impl RunSession {
    pub fn new(user_id: Uuid, started_at: DateTime<Utc>, distance_meters: f64, duration_s: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            started_at,
            distance_meters,
            duration_s,
            route_url: None,
        }
    }

    pub fn with_route(mut self, route_url: impl Into<String>) -> Self {
        self.route_url = Some(route_url.into());
        self
    }
}

static ATTRIBUTES: [Attribute<RunSession>; 6] = [
    Attribute {
        name: "id",
        kind: AttributeType::Uuid,
        optional: false,
        get: |r| Value::Uuid(r.id),
        set: |r, v| {
            r.id = v.as_uuid()?;
            Some(())
        },
    },
    Attribute {
        name: "user_id",
        kind: AttributeType::Uuid,
        optional: false,
        get: |r| Value::Uuid(r.user_id),
        set: |r, v| {
            r.user_id = v.as_uuid()?;
            Some(())
        },
    },
    Attribute {
        name: "started_at",
        kind: AttributeType::Date,
        optional: false,
        get: |r| Value::Date(r.started_at),
        set: |r, v| {
            r.started_at = v.as_date()?;
            Some(())
        },
    },
    Attribute {
        name: "distance_meters",
        kind: AttributeType::Double,
        optional: false,
        get: |r| Value::Double(r.distance_meters),
        set: |r, v| {
            r.distance_meters = v.as_f64()?;
            Some(())
        },
    },
    Attribute {
        name: "duration_s",
        kind: AttributeType::Integer,
        optional: false,
        get: |r| Value::Integer(r.duration_s),
        set: |r, v| {
            r.duration_s = v.as_i64()?;
            Some(())
        },
    },
    Attribute {
        name: "route_url",
        kind: AttributeType::String,
        optional: true,
        get: |r| r.route_url.clone().map_or(Value::Null, Value::String),
        set: |r, v| {
            r.route_url = v.as_optional_str()?.map(str::to_string);
            Some(())
        },
    },
];

impl Entity for RunSession {
    const NAME: &'static str = "RunSession";
    const TABLE: &'static str = "run_sessions";

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
    use chrono::TimeZone;

    fn sample() -> RunSession {
        let started_at = Utc.with_ymd_and_hms(2026, 3, 14, 7, 30, 0).unwrap();
        RunSession::new(Uuid::new_v4(), started_at, 5000.0, 1500)
    }

    #[test]
    fn test_run_session_record_roundtrip() {
        let run = sample().with_route("https://maps.example/r/1");
        let record = run.to_record();
        assert_eq!(record.get("distance_meters"), &Value::Double(5000.0));
        assert_eq!(RunSession::from_record(&record).unwrap(), run);
    }

    #[test]
    fn test_route_is_optional() {
        let run = sample();
        let record = run.to_record();
        assert!(record.get("route_url").is_null());
        assert_eq!(RunSession::from_record(&record).unwrap().route_url, None);
    }
}
