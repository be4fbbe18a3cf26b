//! RLS resolver: (role, resource) -> scope.

use std::collections::BTreeMap;

use serde::Serialize;

use fieldops_auth::RlsScope;

use crate::registry::EntityRegistry;

/// Scopes for every RLS resource, keyed by resource then role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RlsPolicies {
    resources: BTreeMap<String, BTreeMap<String, RlsScope>>,
}

impl RlsPolicies {
    /// Scope of `role` on `resource`. `None` means no policy: the caller denies.
    pub fn resolve(&self, role: &str, resource: &str) -> Option<RlsScope> {
        self.resources.get(resource)?.get(role).copied()
    }

    pub fn policies_for(&self, resource: &str) -> Option<&BTreeMap<String, RlsScope>> {
        self.resources.get(resource)
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}

/// Collect every entity's `rlsPolicy` under its RLS resource name.
///
/// Unknown tags were already rejected by the metadata validator; any that
/// slip through are skipped so the role falls back to deny.
pub fn derive_rls(registry: &EntityRegistry) -> RlsPolicies {
    let mut resources: BTreeMap<String, BTreeMap<String, RlsScope>> = BTreeMap::new();

    for (key, descriptor) in registry.iter() {
        let policies = resources.entry(descriptor.rls_resource().to_string()).or_default();
        for (role, tag) in &descriptor.rls_policy {
            match tag.parse::<RlsScope>() {
                Ok(scope) => {
                    policies.insert(role.clone(), scope);
                }
                Err(e) => tracing::warn!(entity = key, role = %role, error = %e, "ignoring rls policy"),
            }
        }
    }

    RlsPolicies { resources }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_policies() {
        let policies = derive_rls(&EntityRegistry::builtin().unwrap());

        assert_eq!(
            policies.resolve("customer", "work_orders"),
            Some(RlsScope::OwnWorkOrdersOnly)
        );
        assert_eq!(
            policies.resolve("technician", "work_orders"),
            Some(RlsScope::AssignedWorkOrdersOnly)
        );
        assert_eq!(policies.resolve("customer", "technicians"), Some(RlsScope::DenyAll));
        assert_eq!(policies.resolve("admin", "audit_logs"), Some(RlsScope::AllRecords));
        assert_eq!(policies.resolve("manager", "audit_logs"), None);
    }

    #[test]
    fn unknown_role_or_resource_resolves_to_nothing() {
        let policies = derive_rls(&EntityRegistry::builtin().unwrap());
        assert_eq!(policies.resolve("intern", "customers"), None);
        assert_eq!(policies.resolve("admin", "spaceships"), None);
    }
}
