//! Which roles see an entity in navigation.

use serde::Serialize;

use fieldops_auth::{PermissionMatrix, Role, RoleHierarchy};
use fieldops_core::Operation;

use crate::registry::EntityRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEntry {
    pub entity_key: String,
    pub display_name: String,
    pub icon: Option<String>,
    /// Least privileged role that sees the entry; `None` hides it from everyone.
    pub minimum_role: Option<Role>,
    pub minimum_priority: u32,
    /// Whether `navVisibility` named the role instead of the read permission.
    pub explicit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Navigation {
    entries: Vec<NavigationEntry>,
}

impl Navigation {
    pub fn entries(&self) -> &[NavigationEntry] {
        &self.entries
    }

    pub fn entry(&self, entity: &str) -> Option<&NavigationEntry> {
        self.entries.iter().find(|e| e.entity_key == entity)
    }

    /// Entries a role may see, in entity key order.
    pub fn visible_to<'a>(&'a self, hierarchy: &RoleHierarchy, role: &str) -> Vec<&'a NavigationEntry> {
        let Some(priority) = hierarchy.priority(role) else {
            return Vec::new();
        };
        self.entries
            .iter()
            .filter(|e| e.minimum_role.is_some() && priority >= e.minimum_priority)
            .collect()
    }
}

/// Explicit `navVisibility` role, else the derived read minimum.
pub fn derive_navigation(
    registry: &EntityRegistry,
    hierarchy: &RoleHierarchy,
    matrix: &PermissionMatrix,
) -> Navigation {
    let entries = registry
        .iter()
        .map(|(key, descriptor)| {
            let explicit = descriptor
                .nav_visibility
                .as_ref()
                .and_then(|v| v.as_deref())
                .and_then(|role| hierarchy.roles().iter().find(|r| r.role.as_str() == role));

            let (minimum_role, minimum_priority) = match explicit {
                Some(def) => (Some(def.role.clone()), def.priority),
                None => match matrix.entry(key, Operation::Read) {
                    Some(entry) if !entry.disabled => (entry.minimum_role.clone(), entry.minimum_priority),
                    _ => (None, 0),
                },
            };

            NavigationEntry {
                entity_key: key.to_string(),
                display_name: descriptor.label().to_string(),
                icon: descriptor.icon.clone(),
                minimum_role,
                minimum_priority,
                explicit: explicit.is_some(),
            }
        })
        .collect();

    Navigation { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::derive_permissions;

    fn navigation() -> (RoleHierarchy, Navigation) {
        let registry = EntityRegistry::builtin().unwrap();
        let hierarchy = RoleHierarchy::bootstrap();
        let matrix = derive_permissions(&registry, &hierarchy);
        let nav = derive_navigation(&registry, &hierarchy, &matrix);
        (hierarchy, nav)
    }

    #[test]
    fn explicit_visibility_overrides_read_permission() {
        let (_, nav) = navigation();
        let contract = nav.entry("contract").unwrap();
        assert!(contract.explicit);
        assert_eq!(contract.minimum_role.as_ref().map(Role::as_str), Some("dispatcher"));

        let work_order = nav.entry("work_order").unwrap();
        assert!(!work_order.explicit);
        assert_eq!(work_order.minimum_role.as_ref().map(Role::as_str), Some("customer"));
    }

    #[test]
    fn visible_entries_per_role() {
        let (hierarchy, nav) = navigation();
        let customer: Vec<&str> = nav
            .visible_to(&hierarchy, "customer")
            .iter()
            .map(|e| e.entity_key.as_str())
            .collect();
        assert_eq!(customer, ["customer", "invoice", "work_order"]);

        assert_eq!(nav.visible_to(&hierarchy, "admin").len(), 8);
        assert!(nav.visible_to(&hierarchy, "intern").is_empty());
    }
}
