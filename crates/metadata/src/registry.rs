//! Entity metadata registry.
//!
//! The registry maps an entity key to its descriptor. It is loaded once at
//! boot (embedded documents or a directory of JSON files) and is read-only
//! afterwards; reloading builds a new registry.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use fieldops_core::DomainError;

use crate::descriptor::EntityDescriptor;

const BUILTIN_DOCUMENTS: [(&str, &str); 8] = [
    ("role", include_str!("../entities/role.json")),
    ("user", include_str!("../entities/user.json")),
    ("customer", include_str!("../entities/customer.json")),
    ("technician", include_str!("../entities/technician.json")),
    ("work_order", include_str!("../entities/work_order.json")),
    ("invoice", include_str!("../entities/invoice.json")),
    ("contract", include_str!("../entities/contract.json")),
    ("audit_log", include_str!("../entities/audit_log.json")),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Arc<EntityDescriptor>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of the descriptors shipped with the crate.
    pub fn builtin() -> Result<Self, DomainError> {
        Self::from_documents(BUILTIN_DOCUMENTS.iter().map(|(k, doc)| (k.to_string(), doc.to_string())))
    }

    /// Parse `(registry key, json)` documents.
    ///
    /// Every document is parsed before failing, so the error lists all
    /// unparseable documents at once.
    pub fn from_documents<I>(documents: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut registry = Self::new();
        let mut errors = Vec::new();

        for (key, document) in documents {
            match serde_json::from_str::<EntityDescriptor>(&document) {
                Ok(descriptor) => {
                    if registry.entities.contains_key(&key) {
                        errors.push(format!("{key}: registered more than once"));
                        continue;
                    }
                    registry.entities.insert(key, Arc::new(descriptor));
                }
                Err(e) => errors.push(format!("{key}: {e}")),
            }
        }

        if !errors.is_empty() {
            return Err(DomainError::configuration(format!(
                "failed to load entity metadata:\n  {}",
                errors.join("\n  ")
            )));
        }

        Ok(registry)
    }

    /// Load every `*.json` file in `dir`; the file stem is the registry key.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            DomainError::configuration(format!("cannot read metadata dir {}: {e}", dir.display()))
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let document = std::fs::read_to_string(&path).map_err(|e| {
                DomainError::configuration(format!("cannot read {}: {e}", path.display()))
            })?;
            documents.push((key, document));
        }

        tracing::debug!(dir = %dir.display(), documents = documents.len(), "loading entity metadata");
        Self::from_documents(documents)
    }

    /// Add or replace a descriptor (tests and tooling).
    pub fn insert(&mut self, key: impl Into<String>, descriptor: EntityDescriptor) {
        self.entities.insert(key.into(), Arc::new(descriptor));
    }

    pub fn get(&self, key: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.get(key)
    }

    pub fn by_table(&self, table: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.values().find(|d| d.table_name == table)
    }

    pub fn by_rls_resource(&self, resource: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.values().find(|d| d.rls_resource() == resource)
    }

    pub fn entity_keys(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.entities.values().map(|d| d.table_name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<EntityDescriptor>)> {
        self.entities.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_loads_every_document() {
        let registry = EntityRegistry::builtin().unwrap();
        assert_eq!(registry.len(), BUILTIN_DOCUMENTS.len());
        assert_eq!(registry.get("work_order").unwrap().table_name, "work_orders");
        assert_eq!(registry.by_table("customers").unwrap().entity_key, "customer");
        assert_eq!(registry.by_rls_resource("invoices").unwrap().entity_key, "invoice");
    }

    #[test]
    fn parse_errors_are_collected_across_documents() {
        let err = EntityRegistry::from_documents(vec![
            ("a".to_string(), "{ not json".to_string()),
            ("b".to_string(), r#"{ "entityKey": "b", "fields": 3 }"#.to_string()),
            ("c".to_string(), r#"{ "entityKey": "c", "tableName": "cs" }"#.to_string()),
        ])
        .unwrap_err();

        let DomainError::Configuration(msg) = err else {
            panic!("expected configuration error");
        };
        assert!(msg.contains("a: "));
        assert!(msg.contains("b: "));
        assert!(!msg.contains("c: "));
    }
}
