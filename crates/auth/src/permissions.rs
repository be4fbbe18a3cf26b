use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fieldops_core::Operation;

use crate::{Role, RoleHierarchy};

/// Minimum role required for one (resource, operation) pair.
///
/// A disabled entry has no minimum role: no API actor may invoke the
/// operation, whatever its priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub minimum_role: Option<Role>,
    pub minimum_priority: u32,
    pub description: String,
    pub disabled: bool,
}

impl PermissionEntry {
    pub fn granted_to(role: Role, priority: u32, description: impl Into<String>) -> Self {
        Self {
            minimum_role: Some(role),
            minimum_priority: priority,
            description: description.into(),
            disabled: false,
        }
    }

    pub fn disabled(description: impl Into<String>) -> Self {
        Self {
            minimum_role: None,
            minimum_priority: 0,
            description: description.into(),
            disabled: true,
        }
    }

    /// Whether an actor of the given priority may invoke the operation.
    pub fn allows(&self, priority: u32) -> bool {
        !self.disabled && priority >= self.minimum_priority
    }
}

/// The derived role x resource x operation authorization table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionMatrix {
    resources: BTreeMap<String, BTreeMap<Operation, PermissionEntry>>,
}

impl PermissionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: impl Into<String>, operation: Operation, entry: PermissionEntry) {
        self.resources
            .entry(resource.into())
            .or_default()
            .insert(operation, entry);
    }

    pub fn entry(&self, resource: &str, operation: Operation) -> Option<&PermissionEntry> {
        self.resources.get(resource)?.get(&operation)
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn operations(&self, resource: &str) -> Option<&BTreeMap<Operation, PermissionEntry>> {
        self.resources.get(resource)
    }

    /// Role check against the matrix. Unknown roles and resources are denied.
    pub fn has_permission(
        &self,
        hierarchy: &RoleHierarchy,
        role: &str,
        resource: &str,
        operation: Operation,
    ) -> bool {
        let Some(priority) = hierarchy.priority(role) else {
            return false;
        };
        self.entry(resource, operation)
            .is_some_and(|entry| entry.allows(priority))
    }

    /// `{resource: {operation: minimumPriority}}` view for routing middleware.
    ///
    /// Disabled operations report priority 0 and must be checked through
    /// [`PermissionMatrix::entry`]; the view alone does not carry the flag.
    pub fn priorities(&self) -> BTreeMap<String, BTreeMap<Operation, u32>> {
        self.resources
            .iter()
            .map(|(resource, ops)| {
                let ops = ops
                    .iter()
                    .map(|(op, entry)| (*op, entry.minimum_priority))
                    .collect();
                (resource.clone(), ops)
            })
            .collect()
    }
}
