//! Validation deriver: entity metadata -> payload schemas.
//!
//! Constraint resolution order for a field:
//! 1. shared definitions for common names (`email`, `phone`, ...);
//! 2. address group parts (`<prefix>_state`, `<prefix>_country`, ...);
//! 3. the field's declared type and bounds.
//!
//! The entity's own `required` decision always wins over a shared definition.

pub mod address;
pub mod constraint;
pub mod schema;
pub mod shared;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::descriptor::{EntityDescriptor, FieldDefinition, FieldType};
use crate::registry::EntityRegistry;

pub use constraint::{FieldConstraint, Pattern};
pub use schema::{CompositeSchema, SchemaKind};

/// Create and update schemas of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySchemas {
    pub create: CompositeSchema,
    pub update: CompositeSchema,
}

impl EntitySchemas {
    pub fn get(&self, kind: SchemaKind) -> &CompositeSchema {
        match kind {
            SchemaKind::Create => &self.create,
            SchemaKind::Update => &self.update,
        }
    }
}

/// Frozen set of derived schemas for every entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationCatalog {
    entities: BTreeMap<String, EntitySchemas>,
}

impl ValidationCatalog {
    pub fn schema(&self, entity: &str, kind: SchemaKind) -> Option<&CompositeSchema> {
        self.entities.get(entity).map(|s| s.get(kind))
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

pub fn derive_validation(registry: &EntityRegistry) -> ValidationCatalog {
    let entities = registry
        .iter()
        .map(|(key, descriptor)| (key.to_string(), derive_entity(key, descriptor)))
        .collect();
    ValidationCatalog { entities }
}

pub fn derive_entity(key: &str, descriptor: &EntityDescriptor) -> EntitySchemas {
    let required = required_set(descriptor);
    let prefixes = address::address_prefixes(descriptor);

    let mut constraints = BTreeMap::new();
    for (name, def) in &descriptor.fields {
        if name == &descriptor.primary_key || def.readonly {
            continue;
        }
        let constraint = field_constraint(name, def, &prefixes).required(required.contains(name.as_str()));
        constraints.insert(name.clone(), constraint);
    }

    // Required foreign keys may be declared by convention only.
    for name in &required {
        if !constraints.contains_key(*name) && !descriptor.fields.contains_key(*name) {
            let target = name.trim_end_matches("_id");
            constraints.insert(
                name.to_string(),
                FieldConstraint::new(FieldType::ForeignKey)
                    .required(true)
                    .message(format!("must reference an existing {target} record")),
            );
        }
    }

    let required_fields: Vec<String> = match &descriptor.required_fields {
        Some(list) => list.iter().filter(|f| constraints.contains_key(*f)).cloned().collect(),
        None => constraints
            .iter()
            .filter(|(_, c)| c.required)
            .map(|(name, _)| name.clone())
            .collect(),
    };
    let optional_fields: Vec<String> = constraints
        .keys()
        .filter(|name| !required_fields.contains(*name))
        .cloned()
        .collect();

    let constraints = Arc::new(constraints);

    let create = CompositeSchema {
        entity: key.to_string(),
        kind: SchemaKind::Create,
        required_fields: required_fields.clone(),
        optional_fields,
        field_constraints: constraints.clone(),
        address_prefixes: prefixes.clone(),
    };
    let update = CompositeSchema {
        entity: key.to_string(),
        kind: SchemaKind::Update,
        required_fields: Vec::new(),
        optional_fields: constraints.keys().cloned().collect(),
        field_constraints: constraints,
        address_prefixes: prefixes,
    };

    EntitySchemas { create, update }
}

/// `requiredFields` when declared (authoritative), else fields flagged
/// `required: true`.
fn required_set(descriptor: &EntityDescriptor) -> BTreeSet<&str> {
    match &descriptor.required_fields {
        Some(list) => list.iter().map(String::as_str).collect(),
        None => descriptor
            .fields
            .iter()
            .filter(|(_, def)| def.is_required())
            .map(|(name, _)| name.as_str())
            .collect(),
    }
}

fn field_constraint(name: &str, def: &FieldDefinition, prefixes: &BTreeSet<String>) -> FieldConstraint {
    let mut constraint = shared::shared_constraint(name)
        .or_else(|| address::address_part(name, prefixes).and_then(address::address_constraint))
        .unwrap_or_else(|| declared_constraint(name, def));

    if constraint.default.is_none() {
        constraint.default = def.default.clone();
    }
    constraint
}

fn declared_constraint(name: &str, def: &FieldDefinition) -> FieldConstraint {
    let kind = def.kind().unwrap_or(FieldType::Json);
    let mut constraint = FieldConstraint::new(kind)
        .length(def.min_length, def.max_length)
        .range(def.min, def.max);

    if let Some(pattern) = def.pattern.as_deref().and_then(|p| Pattern::new(p).ok()) {
        constraint = constraint.pattern(pattern);
    }

    if kind == FieldType::Enum {
        let values = def.values.clone().unwrap_or_default();
        constraint = constraint
            .message(format!("must be one of: {}", values.join(", ")))
            .one_of(values);
    }

    if def.is_foreign_key() {
        constraint.kind = FieldType::ForeignKey;
        let target = def
            .references
            .as_ref()
            .map(|fk| fk.table.clone())
            .unwrap_or_else(|| name.trim_end_matches("_id").to_string());
        constraint = constraint.message(format!("must reference an existing record in {target}"));
    }

    constraint
}
