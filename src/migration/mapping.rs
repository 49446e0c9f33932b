//! Mapping models: how records of one schema version become records of another.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::MigrationError;
use crate::schema::{AttributeType, DefaultValue, EntityDef, SchemaModel};
use crate::value::{Record, Value};

/// Per-record conversion hook. Receives the source record and a destination
/// record already filled in by the automatic rule.
pub type Transform = Arc<dyn Fn(&Record, &mut Record) -> Result<(), String> + Send + Sync>;

/// Custom transforms keyed by `(source entity, destination entity)`.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<(String, String), Transform>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, source: &str, destination: &str, transform: F)
    where
        F: Fn(&Record, &mut Record) -> Result<(), String> + Send + Sync + 'static,
    {
        self.transforms.insert(
            (source.to_string(), destination.to_string()),
            Arc::new(transform),
        );
    }

    pub fn with<F>(mut self, source: &str, destination: &str, transform: F) -> Self
    where
        F: Fn(&Record, &mut Record) -> Result<(), String> + Send + Sync + 'static,
    {
        self.register(source, destination, transform);
        self
    }

    pub fn get(&self, source: &str, destination: &str) -> Option<&Transform> {
        self.transforms
            .get(&(source.to_string(), destination.to_string()))
    }

    /// Source entities registered for `destination`, sorted by name.
    fn sources_for(&self, destination: &str) -> Vec<&str> {
        let mut sources: Vec<&str> = self
            .transforms
            .keys()
            .filter(|(_, d)| d == destination)
            .map(|(s, _)| s.as_str())
            .collect();
        sources.sort_unstable();
        sources
    }

    /// The transforms shipped with this build.
    pub fn bundled() -> Self {
        TransformRegistry::new()
            .with("User", "User", |source, destination| {
                if let Some(url) = source.get("avatar_url").as_str() {
                    destination.set("avatar_url", Value::String(upgrade_scheme(url)));
                }
                Ok(())
            })
            .with("RunSession", "RunSession", |source, destination| {
                if let Some(url) = source.get("route_url").as_str() {
                    destination.set("route_url", Value::String(upgrade_scheme(url)));
                }
                if source.contains("distance_m") {
                    match source.get("distance_m") {
                        Value::Double(d) => destination.set("distance_meters", Value::Double(*d)),
                        other => return Err(format!("distance_m is not a number: {}", other)),
                    }
                }
                Ok(())
            })
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.transforms.keys().collect();
        keys.sort();
        f.debug_struct("TransformRegistry")
            .field("transforms", &keys)
            .finish()
    }
}

/// Rewrites an `http://` URL to `https://`; anything else is returned as is.
pub fn upgrade_scheme(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

#[derive(Clone)]
pub enum MappingRule {
    Automatic,
    Custom(Transform),
}

impl fmt::Debug for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingRule::Automatic => write!(f, "Automatic"),
            MappingRule::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// How records of one source entity become records of one destination entity.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    pub source_entity: String,
    pub destination_entity: String,
    /// Attributes copied unchanged: same name and type on both sides.
    pub copies: Vec<String>,
    /// Attributes filled from the destination schema's defaults.
    pub defaults: Vec<(String, AttributeType, DefaultValue)>,
    /// Optional attributes with no source, left null.
    pub nulls: Vec<String>,
    pub rule: MappingRule,
}

impl EntityMapping {
    fn infer(
        source: &EntityDef,
        destination: &EntityDef,
        rule: MappingRule,
    ) -> Result<Self, MigrationError> {
        let custom = matches!(rule, MappingRule::Custom(_));
        let mut copies = Vec::new();
        let mut defaults = Vec::new();
        let mut nulls = Vec::new();

        for attribute in &destination.attributes {
            let name = &attribute.name;
            match source.attribute(name) {
                Some(from) if from.kind == attribute.kind => copies.push(name.clone()),
                Some(from) => {
                    // The transform owns type changes.
                    if !custom {
                        return Err(MigrationError::inference(
                            &destination.name,
                            name,
                            format!("type changed from {} to {}", from.kind, attribute.kind),
                        ));
                    }
                }
                None => match &attribute.default {
                    Some(default) => defaults.push((name.clone(), attribute.kind, default.clone())),
                    None if attribute.optional => nulls.push(name.clone()),
                    None if custom => {}
                    None => {
                        return Err(MigrationError::inference(
                            &destination.name,
                            name,
                            "required attribute has no source, default or transform",
                        ))
                    }
                },
            }
        }

        Ok(Self {
            source_entity: source.name.clone(),
            destination_entity: destination.name.clone(),
            copies,
            defaults,
            nulls,
            rule,
        })
    }

    /// Converts one source record. The result is checked against
    /// `destination` before it is returned.
    pub fn apply(
        &self,
        source: &Record,
        destination: &EntityDef,
        now: DateTime<Utc>,
    ) -> Result<Record, MigrationError> {
        let mut record = Record::new(&self.destination_entity);
        for name in &self.copies {
            record.set(name.as_str(), source.get(name).clone());
        }
        for (name, kind, default) in &self.defaults {
            record.set(name.as_str(), default.resolve(*kind, now).unwrap_or(Value::Null));
        }
        for name in &self.nulls {
            record.set(name.as_str(), Value::Null);
        }

        if let MappingRule::Custom(transform) = &self.rule {
            transform(source, &mut record).map_err(|reason| self.failure(source, reason))?;
        }

        record
            .validate(destination)
            .map_err(|e| self.failure(source, e.to_string()))?;
        Ok(record)
    }

    fn failure(&self, source: &Record, reason: String) -> MigrationError {
        MigrationError::Transform {
            from_entity: self.source_entity.clone(),
            to_entity: self.destination_entity.clone(),
            record: source
                .id()
                .map_or_else(|| "<no id>".to_string(), |id| id.to_string()),
            reason,
        }
    }
}

/// The complete mapping between two schema versions, built per attempt.
#[derive(Debug, Clone)]
pub struct MappingModel {
    pub source_version: String,
    pub destination_version: String,
    pub entities: Vec<EntityMapping>,
}

impl MappingModel {
    /// Pairs every destination entity with its source entity and infers the
    /// attribute mapping.
    ///
    /// A registered transform whose source exists in `source` wins over the
    /// same-name pairing. Destination entities with no source start empty.
    pub fn resolve(
        source: &SchemaModel,
        destination: &SchemaModel,
        registry: &TransformRegistry,
    ) -> Result<Self, MigrationError> {
        let mut entities = Vec::new();

        for to in &destination.entities {
            let registered = registry
                .sources_for(&to.name)
                .into_iter()
                .filter_map(|name| source.entity(name))
                .min_by_key(|from| from.name != to.name);

            let mapping = match registered {
                Some(from) => {
                    let rule = registry
                        .get(&from.name, &to.name)
                        .cloned()
                        .map_or(MappingRule::Automatic, MappingRule::Custom);
                    EntityMapping::infer(from, to, rule)?
                }
                None => match source.entity(&to.name) {
                    Some(from) => EntityMapping::infer(from, to, MappingRule::Automatic)?,
                    None => {
                        tracing::debug!("Entity {} is new in schema {}", to.name, destination.version);
                        continue;
                    }
                },
            };
            entities.push(mapping);
        }

        for from in &source.entities {
            if !entities.iter().any(|m| m.source_entity == from.name) {
                tracing::debug!(
                    "Entity {} is not carried into schema {}",
                    from.name,
                    destination.version
                );
            }
        }

        Ok(Self {
            source_version: source.version.clone(),
            destination_version: destination.version.clone(),
            entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaCatalog;
    use uuid::Uuid;

    fn schema(version: &str) -> &'static SchemaModel {
        SchemaCatalog::bundled().version(version).unwrap()
    }

    fn mapping<'m>(model: &'m MappingModel, entity: &str) -> &'m EntityMapping {
        model
            .entities
            .iter()
            .find(|m| m.destination_entity == entity)
            .unwrap()
    }

    #[test]
    fn test_upgrade_scheme() {
        assert_eq!(upgrade_scheme("http://img.example/a.png"), "https://img.example/a.png");
        assert_eq!(upgrade_scheme("https://img.example/a.png"), "https://img.example/a.png");
        assert_eq!(upgrade_scheme("ftp://x"), "ftp://x");
    }

    #[test]
    fn test_automatic_mapping_fills_defaults() {
        let model = MappingModel::resolve(schema("1"), schema("2"), &TransformRegistry::new()).unwrap();
        let user = mapping(&model, "User");

        assert!(matches!(user.rule, MappingRule::Automatic));
        assert_eq!(user.copies, vec!["id", "username", "avatar_url"]);
        assert_eq!(user.defaults.len(), 1);
        assert_eq!(user.defaults[0].0, "created_at");

        let now = crate::value::now();
        let source = Record::new("User")
            .with("id", Value::Uuid(Uuid::new_v4()))
            .with("username", Value::String("ann".into()))
            .with("avatar_url", Value::Null);
        let migrated = user
            .apply(&source, schema("2").entity("User").unwrap(), now)
            .unwrap();
        assert_eq!(migrated.get("created_at"), &Value::Date(now));
        assert_eq!(migrated.get("username").as_str(), Some("ann"));
    }

    #[test]
    fn test_renamed_attribute_needs_transform() {
        let err = MappingModel::resolve(schema("2"), schema("3"), &TransformRegistry::new()).unwrap_err();
        match err {
            MigrationError::MappingInference { entity, attribute, .. } => {
                assert_eq!(entity, "RunSession");
                assert_eq!(attribute, "distance_meters");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_bundled_transforms_rename_and_upgrade() {
        let model = MappingModel::resolve(schema("1"), schema("3"), &TransformRegistry::bundled()).unwrap();
        let runs = mapping(&model, "RunSession");
        assert!(matches!(runs.rule, MappingRule::Custom(_)));

        let source = Record::new("RunSession")
            .with("id", Value::Uuid(Uuid::new_v4()))
            .with("user_id", Value::Uuid(Uuid::new_v4()))
            .with("started_at", Value::Date(crate::value::now()))
            .with("distance_m", Value::Double(4200.5))
            .with("duration_s", Value::Integer(1800))
            .with("route_url", Value::String("http://maps.example/r/9".into()));
        let migrated = runs
            .apply(&source, schema("3").entity("RunSession").unwrap(), crate::value::now())
            .unwrap();

        assert_eq!(migrated.get("distance_meters"), &Value::Double(4200.5));
        assert_eq!(migrated.get("route_url").as_str(), Some("https://maps.example/r/9"));
        assert!(!migrated.contains("distance_m"));
    }

    #[test]
    fn test_friend_status_defaults_to_accepted() {
        let model = MappingModel::resolve(schema("2"), schema("3"), &TransformRegistry::bundled()).unwrap();
        let friends = mapping(&model, "Friend");
        let source = Record::new("Friend")
            .with("id", Value::Uuid(Uuid::new_v4()))
            .with("user_id", Value::Uuid(Uuid::new_v4()))
            .with("friend_user_id", Value::Uuid(Uuid::new_v4()));
        let migrated = friends
            .apply(&source, schema("3").entity("Friend").unwrap(), crate::value::now())
            .unwrap();
        assert_eq!(migrated.get("status").as_str(), Some("accepted"));
    }

    #[test]
    fn test_failing_transform_reports_record() {
        let registry = TransformRegistry::new().with("User", "User", |_, _| Err("rejected".to_string()));
        let model = MappingModel::resolve(schema("1"), schema("2"), &registry).unwrap();
        let id = Uuid::new_v4();
        let source = Record::new("User")
            .with("id", Value::Uuid(id))
            .with("username", Value::String("ann".into()));

        let err = mapping(&model, "User")
            .apply(&source, schema("2").entity("User").unwrap(), crate::value::now())
            .unwrap_err();
        assert!(err.to_string().contains(&id.to_string()));
        assert!(err.to_string().contains("rejected"));
    }

    #[test]
    fn test_transform_output_is_validated() {
        let registry = TransformRegistry::new().with("User", "User", |_, destination| {
            destination.set("username", Value::Null);
            Ok(())
        });
        let model = MappingModel::resolve(schema("1"), schema("2"), &registry).unwrap();
        let source = Record::new("User")
            .with("id", Value::Uuid(Uuid::new_v4()))
            .with("username", Value::String("ann".into()));

        let result = mapping(&model, "User").apply(
            &source,
            schema("2").entity("User").unwrap(),
            crate::value::now(),
        );
        assert!(matches!(result, Err(MigrationError::Transform { .. })));
    }
}
