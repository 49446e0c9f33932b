//! Bundled schema history.
//!
//! Every schema version the application has ever shipped is compiled into
//! the binary, oldest first. The last entry is the current schema.

use std::sync::OnceLock;

use super::model::{SchemaError, SchemaModel};

const BUNDLED: &[&str] = &[
    include_str!("../../schemas/v1.yaml"),
    include_str!("../../schemas/v2.yaml"),
    include_str!("../../schemas/v3.yaml"),
];

static BUNDLED_CATALOG: OnceLock<SchemaCatalog> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    versions: Vec<SchemaModel>,
}

impl SchemaCatalog {
    /// Builds a catalog from YAML documents, oldest first.
    pub fn from_documents(documents: &[&str]) -> Result<Self, SchemaError> {
        let versions = documents
            .iter()
            .map(|doc| SchemaModel::from_yaml(doc))
            .collect::<Result<Vec<_>, _>>()?;

        if versions.is_empty() {
            return Err(SchemaError::Invalid {
                version: "<none>".to_string(),
                reason: "catalog holds no schema versions".to_string(),
            });
        }
        for (i, a) in versions.iter().enumerate() {
            if versions[..i].iter().any(|b| b.version == a.version) {
                return Err(SchemaError::Invalid {
                    version: a.version.clone(),
                    reason: "version listed twice".to_string(),
                });
            }
        }

        Ok(Self { versions })
    }

    /// The schemas shipped with this build.
    ///
    /// # Panics
    ///
    /// Panics if a bundled document fails to load. That is a packaging
    /// defect and the application cannot run without its schema.
    pub fn bundled() -> &'static SchemaCatalog {
        BUNDLED_CATALOG.get_or_init(|| match SchemaCatalog::from_documents(BUNDLED) {
            Ok(catalog) => catalog,
            Err(e) => panic!("bundled schema failed to load: {}", e),
        })
    }

    pub fn current(&self) -> &SchemaModel {
        // from_documents guarantees at least one version
        &self.versions[self.versions.len() - 1]
    }

    pub fn versions(&self) -> &[SchemaModel] {
        &self.versions
    }

    pub fn version(&self, version: &str) -> Option<&SchemaModel> {
        self.versions.iter().find(|s| s.version == version)
    }

    /// Finds the historical schema a store was created with.
    ///
    /// Newer versions win if two versions happen to share a structure.
    pub fn find_by_signature(&self, signature: &str) -> Option<&SchemaModel> {
        self.versions
            .iter()
            .rev()
            .find(|s| s.signature() == signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_catalog_loads() {
        let catalog = SchemaCatalog::bundled();
        let versions: Vec<&str> = catalog.versions().iter().map(|s| s.version.as_str()).collect();
        assert_eq!(versions, vec!["1", "2", "3"]);
        assert_eq!(catalog.current().version, "3");
    }

    #[test]
    fn test_bundled_signatures_are_distinct() {
        let catalog = SchemaCatalog::bundled();
        let v1 = catalog.version("1").unwrap().signature();
        let v2 = catalog.version("2").unwrap().signature();
        let v3 = catalog.version("3").unwrap().signature();
        assert_ne!(v1, v2);
        assert_ne!(v2, v3);
        assert_ne!(v1, v3);
    }

    #[test]
    fn test_find_by_signature() {
        let catalog = SchemaCatalog::bundled();
        let v2 = catalog.version("2").unwrap();
        assert_eq!(
            catalog.find_by_signature(&v2.signature()).map(|s| s.version.as_str()),
            Some("2")
        );
        assert!(catalog.find_by_signature("deadbeef").is_none());
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(SchemaCatalog::from_documents(&[]).is_err());
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let err = SchemaCatalog::from_documents(&[BUNDLED[0], BUNDLED[0]]).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }
}
