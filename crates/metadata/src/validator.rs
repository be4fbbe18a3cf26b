//! Startup gate for entity metadata.
//!
//! Runs a fixed battery of checks on every descriptor, collecting every
//! violation of every entity before reporting. Valid role names come from the
//! role hierarchy passed in, never from a hardcoded list.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use fieldops_auth::{RlsScope, RoleHierarchy, ACCESS_NONE};
use fieldops_core::{DomainError, Operation};

use crate::descriptor::{EntityDescriptor, FieldType, PermissionOverride};
use crate::registry::EntityRegistry;

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Turn an invalid report into one aggregated configuration error.
    pub throw_on_error: bool,
}

impl ValidateOptions {
    pub fn throwing() -> Self {
        Self { throw_on_error: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Entity key -> violations, in entity key order.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// One line per entity header plus one line per violation.
    pub fn render(&self) -> String {
        let mut out = format!(
            "entity metadata validation failed ({} violations in {} entities):",
            self.error_count(),
            self.errors.len()
        );
        for (entity, errors) in &self.errors {
            out.push_str(&format!("\n  {entity}:"));
            for error in errors {
                out.push_str(&format!("\n    - {error}"));
            }
        }
        out
    }
}

/// Validate every descriptor in the registry.
pub fn validate_all(
    registry: &EntityRegistry,
    hierarchy: &RoleHierarchy,
    options: ValidateOptions,
) -> Result<ValidationReport, DomainError> {
    let tables: BTreeSet<&str> = registry.table_names().collect();

    let mut report = ValidationReport {
        valid: true,
        errors: BTreeMap::new(),
    };

    for (key, descriptor) in registry.iter() {
        let errors = validate_entity(key, descriptor, registry, &tables, hierarchy);
        if !errors.is_empty() {
            report.valid = false;
            report.errors.insert(key.to_string(), errors);
        }
    }

    if report.valid {
        tracing::debug!(entities = registry.len(), "entity metadata validated");
    } else {
        tracing::error!(
            violations = report.error_count(),
            entities = report.errors.len(),
            "entity metadata is invalid"
        );
        if options.throw_on_error {
            return Err(DomainError::configuration(report.render()));
        }
    }

    Ok(report)
}

fn validate_entity(
    key: &str,
    d: &EntityDescriptor,
    registry: &EntityRegistry,
    tables: &BTreeSet<&str>,
    hierarchy: &RoleHierarchy,
) -> Vec<String> {
    let mut errs = Vec::new();

    check_identity(key, d, &mut errs);
    check_ui_properties(d, hierarchy, &mut errs);
    check_fields(d, tables, &mut errs);
    check_required_fields(d, &mut errs);
    check_field_access(d, hierarchy, &mut errs);
    check_entity_permissions(d, hierarchy, &mut errs);
    check_rls_policy(d, hierarchy, &mut errs);
    check_query_fields(d, &mut errs);
    check_dependents(d, registry, &mut errs);

    errs
}

fn check_identity(key: &str, d: &EntityDescriptor, errs: &mut Vec<String>) {
    if d.entity_key.is_empty() {
        errs.push("missing required property 'entityKey'".to_string());
    } else if d.entity_key != key {
        errs.push(format!(
            "entityKey '{}' does not match registry key '{key}'",
            d.entity_key
        ));
    }
    if d.table_name.trim().is_empty() {
        errs.push("missing required property 'tableName'".to_string());
    }
    if d.primary_key.trim().is_empty() {
        errs.push("missing required property 'primaryKey'".to_string());
    } else if !d.fields.is_empty() && !d.fields.contains_key(&d.primary_key) {
        errs.push(format!("primaryKey '{}' is not a declared field", d.primary_key));
    }
    if d.display_name.trim().is_empty() {
        errs.push("missing required property 'displayName'".to_string());
    }
    if d.fields.is_empty() {
        errs.push("entity declares no fields".to_string());
    }
}

fn check_ui_properties(d: &EntityDescriptor, hierarchy: &RoleHierarchy, errs: &mut Vec<String>) {
    match d.icon.as_deref() {
        None => errs.push("missing required property 'icon'".to_string()),
        Some(icon) if icon.trim().is_empty() => errs.push("'icon' must be a non-empty string".to_string()),
        Some(_) => {}
    }

    match &d.nav_visibility {
        None => errs.push("missing required property 'navVisibility' (role name or null)".to_string()),
        Some(Some(role)) if !hierarchy.contains(role) => {
            errs.push(format!("navVisibility '{role}' is not a known role"));
        }
        Some(_) => {}
    }

    if d.supports_file_attachments.is_none() {
        errs.push("missing required property 'supportsFileAttachments' (boolean)".to_string());
    }
}

fn check_fields(d: &EntityDescriptor, tables: &BTreeSet<&str>, errs: &mut Vec<String>) {
    for (name, field) in &d.fields {
        let Some(kind) = field.kind() else {
            errs.push(format!("field '{name}': unsupported type '{}'", field.field_type));
            continue;
        };

        if kind == FieldType::Enum && field.values.as_ref().is_none_or(Vec::is_empty) {
            errs.push(format!("field '{name}': enum field must declare non-empty 'values'"));
        }

        if kind == FieldType::ForeignKey && field.references.is_none() {
            errs.push(format!("field '{name}': foreign key must declare 'references'"));
        }

        if let Some(fk) = &field.references {
            if !tables.contains(fk.table.as_str()) {
                errs.push(format!(
                    "field '{name}': foreign key references unknown table '{}'",
                    fk.table
                ));
            }
        }

        if let (Some(min), Some(max)) = (field.min, field.max) {
            if min > max {
                errs.push(format!("field '{name}': min {min} exceeds max {max}"));
            }
        }
        if let (Some(min), Some(max)) = (field.min_length, field.max_length) {
            if min > max {
                errs.push(format!("field '{name}': minLength {min} exceeds maxLength {max}"));
            }
        }

        if let Some(pattern) = &field.pattern {
            if let Err(e) = regex::Regex::new(pattern) {
                errs.push(format!("field '{name}': invalid pattern: {e}"));
            }
        }
    }
}

fn check_required_fields(d: &EntityDescriptor, errs: &mut Vec<String>) {
    let Some(required) = &d.required_fields else {
        return;
    };
    for name in required {
        if *name == d.primary_key {
            errs.push(format!("requiredFields entry '{name}' is the primary key"));
            continue;
        }
        match d.fields.get(name) {
            Some(field) if field.readonly => {
                errs.push(format!("requiredFields entry '{name}' is readonly"));
            }
            Some(_) => {}
            None if name.ends_with("_id") => {
                // Foreign keys may be declared by convention only.
            }
            None => errs.push(format!("requiredFields entry '{name}' is not a declared field")),
        }
    }
}

fn check_field_access(d: &EntityDescriptor, hierarchy: &RoleHierarchy, errs: &mut Vec<String>) {
    let valid = hierarchy.valid_access_values();

    for (name, access) in &d.field_access {
        if !d.fields.contains_key(name) {
            errs.push(format!("fieldAccess references unknown field '{name}'"));
        }
        for op in Operation::ALL {
            if let Some(value) = access.for_operation(op) {
                if !valid.iter().any(|v| v == value) {
                    errs.push(format!(
                        "fieldAccess.{name}.{op}: invalid value '{value}' (expected one of {valid:?})"
                    ));
                }
            }
        }
    }
}

fn check_entity_permissions(d: &EntityDescriptor, hierarchy: &RoleHierarchy, errs: &mut Vec<String>) {
    for op in Operation::ALL {
        if let Some(PermissionOverride::Role(role)) = d.entity_permissions.for_operation(op) {
            if !hierarchy.contains(role) {
                errs.push(format!(
                    "entityPermissions.{op}: invalid value '{role}' (expected null, '{ACCESS_NONE}' or a role name)"
                ));
            }
        }
    }
}

fn check_rls_policy(d: &EntityDescriptor, hierarchy: &RoleHierarchy, errs: &mut Vec<String>) {
    for (role, tag) in &d.rls_policy {
        if !hierarchy.contains(role) {
            errs.push(format!("rlsPolicy references unknown role '{role}'"));
        }
        if tag.parse::<RlsScope>().is_err() {
            errs.push(format!(
                "rlsPolicy.{role}: unknown scope '{tag}' (expected one of {:?})",
                RlsScope::vocabulary()
            ));
        }
    }
}

fn check_query_fields(d: &EntityDescriptor, errs: &mut Vec<String>) {
    let lists = [
        ("searchableFields", &d.searchable_fields),
        ("filterableFields", &d.filterable_fields),
        ("sortableFields", &d.sortable_fields),
    ];
    for (list, fields) in lists {
        for name in fields {
            if !d.fields.contains_key(name) {
                errs.push(format!("{list} references unknown field '{name}'"));
            }
        }
    }

    if let Some(sort) = &d.default_sort {
        if !d.fields.contains_key(&sort.field) {
            errs.push(format!("defaultSort references unknown field '{}'", sort.field));
        }
    }
}

fn check_dependents(d: &EntityDescriptor, registry: &EntityRegistry, errs: &mut Vec<String>) {
    for dep in &d.dependents {
        match registry.get(&dep.entity) {
            None => errs.push(format!("dependent entity '{}' is not registered", dep.entity)),
            Some(other) if !other.fields.contains_key(&dep.foreign_key) => errs.push(format!(
                "dependent '{}' has no field '{}'",
                dep.entity, dep.foreign_key
            )),
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldAccess, FieldDefinition, ForeignKey};

    fn valid_descriptor(key: &str, table: &str) -> EntityDescriptor {
        let mut d = EntityDescriptor::new(key, table);
        d.display_name = "Things".to_string();
        d.icon = Some("box".to_string());
        d.nav_visibility = Some(None);
        d.supports_file_attachments = Some(false);
        d.fields.insert("id".to_string(), FieldDefinition::of_type("integer"));
        d.fields.insert("name".to_string(), FieldDefinition::of_type("string"));
        d.field_access.insert(
            "name".to_string(),
            FieldAccess {
                read: Some("customer".to_string()),
                ..Default::default()
            },
        );
        d.rls_policy.insert("customer".to_string(), "all_records".to_string());
        d
    }

    #[test]
    fn builtin_metadata_is_valid() {
        let registry = EntityRegistry::builtin().unwrap();
        let report = validate_all(&registry, &RoleHierarchy::bootstrap(), ValidateOptions::throwing())
            .unwrap();
        assert!(report.valid, "{}", report.render());
    }

    #[test]
    fn reports_every_independent_defect_in_one_call() {
        let mut d = valid_descriptor("thing", "things");
        d.fields.insert("blob".to_string(), FieldDefinition::of_type("binary"));
        let mut fk = FieldDefinition::of_type("foreignKey");
        fk.references = Some(ForeignKey {
            table: "ghosts".to_string(),
            column: "id".to_string(),
        });
        d.fields.insert("ghost_id".to_string(), fk);
        d.rls_policy.insert("superuser".to_string(), "all_records".to_string());

        let mut registry = EntityRegistry::new();
        registry.insert("thing", d);

        let report = validate_all(&registry, &RoleHierarchy::bootstrap(), ValidateOptions::default())
            .unwrap();
        assert!(!report.valid);

        let errors = &report.errors["thing"];
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("unsupported type 'binary'")));
        assert!(errors.iter().any(|e| e.contains("unknown table 'ghosts'")));
        assert!(errors.iter().any(|e| e.contains("unknown role 'superuser'")));
    }

    #[test]
    fn throwing_mode_aggregates_entities_line_by_line() {
        let mut a = valid_descriptor("a", "as");
        a.icon = None;
        let mut b = valid_descriptor("b", "bs");
        b.rls_policy.insert("customer".to_string(), "everything".to_string());

        let mut registry = EntityRegistry::new();
        registry.insert("a", a);
        registry.insert("b", b);

        let err = validate_all(&registry, &RoleHierarchy::bootstrap(), ValidateOptions::throwing())
            .unwrap_err();
        let DomainError::Configuration(msg) = err else {
            panic!("expected configuration error");
        };
        assert!(msg.contains("\n  a:\n    - missing required property 'icon'"));
        assert!(msg.contains("\n  b:\n    - rlsPolicy.customer: unknown scope 'everything'"));
    }

    #[test]
    fn access_values_follow_the_current_hierarchy() {
        let mut d = valid_descriptor("thing", "things");
        d.field_access.get_mut("name").unwrap().update = Some("auditor".to_string());
        let mut registry = EntityRegistry::new();
        registry.insert("thing", d);

        let bootstrap = RoleHierarchy::bootstrap();
        let report = validate_all(&registry, &bootstrap, ValidateOptions::default()).unwrap();
        assert!(!report.valid);

        let mut roles = bootstrap.roles().to_vec();
        roles.push(fieldops_auth::RoleDefinition {
            role: fieldops_auth::Role::new("auditor"),
            priority: 6,
            description: None,
        });
        let extended = RoleHierarchy::new(roles).unwrap();
        let report = validate_all(&registry, &extended, ValidateOptions::default()).unwrap();
        assert!(report.valid, "{}", report.render());
    }

    #[test]
    fn mismatched_entity_key_and_missing_ui_flags_are_reported() {
        let mut d = valid_descriptor("thing", "things");
        d.entity_key = "other".to_string();
        d.nav_visibility = None;
        d.supports_file_attachments = None;
        let mut registry = EntityRegistry::new();
        registry.insert("thing", d);

        let report = validate_all(&registry, &RoleHierarchy::bootstrap(), ValidateOptions::default())
            .unwrap();
        let errors = &report.errors["thing"];
        assert!(errors.iter().any(|e| e.contains("does not match registry key")));
        assert!(errors.iter().any(|e| e.contains("navVisibility")));
        assert!(errors.iter().any(|e| e.contains("supportsFileAttachments")));
    }

    #[test]
    fn required_fields_cannot_name_the_key_or_readonly_fields() {
        let mut d = valid_descriptor("thing", "things");
        let mut stamp = FieldDefinition::of_type("timestamp");
        stamp.readonly = true;
        d.fields.insert("created_at".to_string(), stamp);
        d.required_fields = Some(vec!["id".to_string(), "created_at".to_string(), "name".to_string()]);
        let mut registry = EntityRegistry::new();
        registry.insert("thing", d);

        let report = validate_all(&registry, &RoleHierarchy::bootstrap(), ValidateOptions::default())
            .unwrap();
        let errors = &report.errors["thing"];
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("'id' is the primary key")));
        assert!(errors.iter().any(|e| e.contains("'created_at' is readonly")));
    }
}
