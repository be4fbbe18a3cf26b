//! Permission deriver: entity metadata + role hierarchy -> permission matrix.

use fieldops_auth::{PermissionEntry, PermissionMatrix, RoleDefinition, RoleHierarchy, ACCESS_NONE, ACCESS_SYSTEM};
use fieldops_core::Operation;

use crate::descriptor::{EntityDescriptor, PermissionOverride};
use crate::registry::EntityRegistry;

/// Derive the full matrix for every registered entity and CRUD operation.
pub fn derive_permissions(registry: &EntityRegistry, hierarchy: &RoleHierarchy) -> PermissionMatrix {
    let mut matrix = PermissionMatrix::new();
    for (key, descriptor) in registry.iter() {
        for op in Operation::ALL {
            matrix.insert(key, op, derive_entry(descriptor, hierarchy, op));
        }
    }
    matrix
}

/// Minimum role for one operation on one entity.
///
/// An explicit entity-level role wins outright; `null` disables the
/// operation; `"none"` (or no override) falls back to the least privileged
/// role granted access to any field. When no field grants the operation to a
/// role, only the most privileged role gets it.
pub fn derive_entry(descriptor: &EntityDescriptor, hierarchy: &RoleHierarchy, op: Operation) -> PermissionEntry {
    let description = describe(descriptor, op);

    let granted = match descriptor.entity_permissions.for_operation(op) {
        Some(PermissionOverride::Disabled) => return PermissionEntry::disabled(description),
        Some(PermissionOverride::Role(role)) => hierarchy.roles().iter().find(|r| r.role.as_str() == role),
        Some(PermissionOverride::Deferred) | None => None,
    };

    let role = granted
        .or_else(|| lowest_field_grant(descriptor, hierarchy, op))
        .unwrap_or_else(|| hierarchy.highest());

    PermissionEntry::granted_to(role.role.clone(), role.priority, description)
}

fn lowest_field_grant<'h>(
    descriptor: &EntityDescriptor,
    hierarchy: &'h RoleHierarchy,
    op: Operation,
) -> Option<&'h RoleDefinition> {
    descriptor
        .field_access
        .values()
        .filter_map(|access| access.for_operation(op))
        .filter(|value| *value != ACCESS_NONE && *value != ACCESS_SYSTEM)
        .filter_map(|value| hierarchy.roles().iter().find(|r| r.role.as_str() == value))
        .min_by_key(|r| r.priority)
}

fn describe(descriptor: &EntityDescriptor, op: Operation) -> String {
    let verb = match op {
        Operation::Create => "Create",
        Operation::Read => "Read",
        Operation::Update => "Update",
        Operation::Delete => "Delete",
    };
    format!("{verb} {}", descriptor.label())
}
