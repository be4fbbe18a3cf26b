use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use fieldops_core::{DomainError, FieldViolation};

use super::address;
use super::constraint::FieldConstraint;

/// Which payload shape a schema checks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Create,
    Update,
}

impl SchemaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaKind::Create => "create",
            SchemaKind::Update => "update",
        }
    }
}

/// Payload schema for one (entity, create|update) pair.
///
/// Create and update schemas of an entity share one constraint map; the
/// update schema simply requires nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSchema {
    pub entity: String,
    pub kind: SchemaKind,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    pub field_constraints: Arc<BTreeMap<String, FieldConstraint>>,
    #[serde(skip)]
    pub(crate) address_prefixes: BTreeSet<String>,
}

impl CompositeSchema {
    pub fn constraint(&self, field: &str) -> Option<&FieldConstraint> {
        self.field_constraints.get(field)
    }

    pub fn accepts_field(&self, field: &str) -> bool {
        self.field_constraints.contains_key(field)
    }

    /// Validate a payload and return its sanitized form.
    ///
    /// Unknown, readonly and primary-key fields are dropped. On create,
    /// declared defaults fill absent optional fields. Every violation is
    /// reported at once, in field order.
    pub fn validate(&self, payload: &JsonValue) -> Result<Map<String, JsonValue>, DomainError> {
        let Some(input) = payload.as_object() else {
            return Err(DomainError::invalid_field("payload", "must be a JSON object"));
        };

        let mut clean = Map::new();
        let mut stripped = Vec::new();
        for (field, value) in input {
            if self.accepts_field(field) {
                clean.insert(field.clone(), value.clone());
            } else {
                stripped.push(field.as_str());
            }
        }
        if !stripped.is_empty() {
            tracing::debug!(entity = %self.entity, fields = ?stripped, "stripped unknown payload fields");
        }

        let mut violations = Vec::new();

        for field in &self.required_fields {
            if clean.get(field).is_none_or(JsonValue::is_null) {
                violations.push(FieldViolation::new(field.as_str(), "is required"));
            }
        }

        for (field, constraint) in self.field_constraints.iter() {
            match clean.get(field) {
                None => {}
                Some(JsonValue::Null) => {
                    if constraint.required && self.kind == SchemaKind::Update {
                        violations.push(FieldViolation::new(field.as_str(), "cannot be null"));
                    }
                }
                Some(value) => {
                    for problem in constraint.check(value) {
                        violations.push(FieldViolation::new(field.as_str(), problem));
                    }
                }
            }
        }

        for prefix in &self.address_prefixes {
            if let Some(violation) = address::check_coherence(prefix, &clean) {
                violations.push(violation);
            }
        }

        if !violations.is_empty() {
            violations.sort_by(|a, b| a.field.cmp(&b.field));
            return Err(DomainError::validation(violations));
        }

        if self.kind == SchemaKind::Create {
            for (field, constraint) in self.field_constraints.iter() {
                if let Some(default) = &constraint.default {
                    clean.entry(field.clone()).or_insert_with(|| default.clone());
                }
            }
        }

        Ok(clean)
    }
}
