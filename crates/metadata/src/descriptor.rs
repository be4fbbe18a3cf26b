//! Declarative entity descriptors.
//!
//! Descriptors are data: they are deserialized from JSON documents and kept
//! close to their source form (field types and access values stay strings) so
//! the validator can report every defect instead of failing on the first one.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use fieldops_core::Operation;

/// Supported field types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Text,
    Integer,
    Number,
    Decimal,
    Currency,
    Boolean,
    Date,
    Timestamp,
    Uuid,
    Email,
    Phone,
    Enum,
    ForeignKey,
    Json,
    Array,
}

impl FieldType {
    /// Parse a descriptor type name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let ty = match name {
            "string" => FieldType::String,
            "text" => FieldType::Text,
            "integer" => FieldType::Integer,
            "number" => FieldType::Number,
            "decimal" => FieldType::Decimal,
            "currency" => FieldType::Currency,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "timestamp" => FieldType::Timestamp,
            "uuid" => FieldType::Uuid,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "enum" => FieldType::Enum,
            "foreignKey" | "foreign_key" => FieldType::ForeignKey,
            "json" | "object" => FieldType::Json,
            "array" => FieldType::Array,
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Number | FieldType::Decimal | FieldType::Currency
        )
    }

    pub fn is_textual(self) -> bool {
        matches!(
            self,
            FieldType::String | FieldType::Text | FieldType::Email | FieldType::Phone
        )
    }
}

/// Foreign-key target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    #[serde(default = "default_fk_column")]
    pub column: String,
}

fn default_fk_column() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDefinition {
    /// Minimal definition of the given type (builder entry point for tests and tooling).
    pub fn of_type(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            required: None,
            readonly: false,
            unique: false,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            pattern: None,
            values: None,
            references: None,
            default: None,
            description: None,
        }
    }

    pub fn kind(&self) -> Option<FieldType> {
        FieldType::parse(&self.field_type)
    }

    pub fn is_foreign_key(&self) -> bool {
        self.kind() == Some(FieldType::ForeignKey) || self.references.is_some()
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }
}

/// Per-field access level for each operation: `none`, `system`, or a role name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccess {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
}

impl FieldAccess {
    pub fn for_operation(&self, operation: Operation) -> Option<&str> {
        match operation {
            Operation::Create => self.create.as_deref(),
            Operation::Read => self.read.as_deref(),
            Operation::Update => self.update.as_deref(),
            Operation::Delete => self.delete.as_deref(),
        }
    }
}

/// Entity-level override for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOverride<'a> {
    /// `null`: no API actor may invoke the operation.
    Disabled,
    /// `"none"`: explicitly no entity-level override.
    Deferred,
    /// A role name that wins over field-level derivation.
    Role(&'a str),
}

/// Entity-level CRUD overrides.
///
/// Each slot is tri-state: absent (no override), `null` (disabled) or a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPermissions {
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub create: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub read: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub update: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub delete: Option<Option<String>>,
}

impl EntityPermissions {
    pub fn raw(&self, operation: Operation) -> Option<Option<&str>> {
        let slot = match operation {
            Operation::Create => &self.create,
            Operation::Read => &self.read,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        };
        slot.as_ref().map(|v| v.as_deref())
    }

    pub fn for_operation(&self, operation: Operation) -> Option<PermissionOverride<'_>> {
        self.raw(operation).map(|value| match value {
            None => PermissionOverride::Disabled,
            Some(fieldops_auth::ACCESS_NONE) => PermissionOverride::Deferred,
            Some(role) => PermissionOverride::Role(role),
        })
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// An entity whose records reference this one (checked before delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependent {
    pub entity: String,
    pub foreign_key: String,
}

/// One business entity's complete declarative description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescriptor {
    #[serde(default)]
    pub entity_key: String,
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub primary_key: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rls_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub nav_visibility: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_file_attachments: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_fields: Option<Vec<String>>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(default)]
    pub field_access: BTreeMap<String, FieldAccess>,
    #[serde(default)]
    pub entity_permissions: EntityPermissions,
    #[serde(default)]
    pub rls_policy: BTreeMap<String, String>,
    #[serde(default)]
    pub searchable_fields: Vec<String>,
    #[serde(default)]
    pub filterable_fields: Vec<String>,
    #[serde(default)]
    pub sortable_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<SortSpec>,
    #[serde(default)]
    pub dependents: Vec<Dependent>,
}

impl EntityDescriptor {
    /// Empty descriptor carrying only identity (builder entry point).
    pub fn new(entity_key: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            entity_key: entity_key.into(),
            table_name: table_name.into(),
            primary_key: "id".to_string(),
            display_name: String::new(),
            rls_resource: None,
            icon: None,
            nav_visibility: None,
            supports_file_attachments: None,
            required_fields: None,
            fields: BTreeMap::new(),
            field_access: BTreeMap::new(),
            entity_permissions: EntityPermissions::default(),
            rls_policy: BTreeMap::new(),
            searchable_fields: Vec::new(),
            filterable_fields: Vec::new(),
            sortable_fields: Vec::new(),
            default_sort: None,
            dependents: Vec::new(),
        }
    }

    /// Name RLS policies are looked up under (defaults to the table name).
    pub fn rls_resource(&self) -> &str {
        self.rls_resource.as_deref().unwrap_or(&self.table_name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    /// Human-readable name, falling back to the entity key.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.entity_key
        } else {
            &self.display_name
        }
    }

    /// Fields declared `unique`, in name order.
    pub fn unique_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, def)| def.unique)
            .map(|(name, _)| name.as_str())
    }

    /// Foreign-key fields with their targets, in name order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&str, &ForeignKey)> {
        self.fields
            .iter()
            .filter_map(|(name, def)| def.references.as_ref().map(|fk| (name.as_str(), fk)))
    }
}

// Absent -> None, null -> Some(None), value -> Some(Some(value)).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_permissions_distinguish_absent_null_and_value() {
        let perms: EntityPermissions =
            serde_json::from_str(r#"{ "create": null, "read": "none", "delete": "manager" }"#).unwrap();

        assert_eq!(perms.for_operation(Operation::Create), Some(PermissionOverride::Disabled));
        assert_eq!(perms.for_operation(Operation::Read), Some(PermissionOverride::Deferred));
        assert_eq!(perms.for_operation(Operation::Update), None);
        assert_eq!(
            perms.for_operation(Operation::Delete),
            Some(PermissionOverride::Role("manager"))
        );
    }

    #[test]
    fn nav_visibility_null_is_present() {
        let d: EntityDescriptor = serde_json::from_str(
            r#"{ "entityKey": "x", "tableName": "xs", "primaryKey": "id", "navVisibility": null }"#,
        )
        .unwrap();
        assert_eq!(d.nav_visibility, Some(None));
        assert_eq!(d.rls_resource(), "xs");

        let missing: EntityDescriptor =
            serde_json::from_str(r#"{ "entityKey": "x", "tableName": "xs" }"#).unwrap();
        assert_eq!(missing.nav_visibility, None);
    }

    #[test]
    fn field_type_names() {
        assert_eq!(FieldType::parse("foreignKey"), Some(FieldType::ForeignKey));
        assert_eq!(FieldType::parse("object"), Some(FieldType::Json));
        assert_eq!(FieldType::parse("blob"), None);
    }
}
