//! Composition root of the access engine.
//!
//! Boot is two-phase: the role hierarchy must be initialized before metadata
//! is validated, because valid access values come from the live roles. Every
//! derived structure is then computed once into an immutable
//! [`EngineSnapshot`]. `reload()` derives a fresh snapshot and swaps it in
//! atomically; readers holding the previous one keep a consistent view.

use std::sync::Arc;

use arc_swap::ArcSwap;

use fieldops_auth::{Actor, PermissionMatrix, RlsScope, RoleHierarchy, RoleHierarchyProvider};
use fieldops_core::{DomainError, Operation};
use fieldops_metadata::{
    derive_navigation, derive_permissions, derive_rls, derive_validation, validate_all, CompositeSchema,
    EntityDescriptor, EntityRegistry, Navigation, NavigationEntry, RlsPolicies, SchemaKind,
    ValidateOptions, ValidationCatalog, ValidationReport,
};

/// Everything derived from one (roles, metadata) pair.
#[derive(Debug)]
pub struct EngineSnapshot {
    pub hierarchy: Arc<RoleHierarchy>,
    pub registry: Arc<EntityRegistry>,
    pub report: ValidationReport,
    pub permissions: PermissionMatrix,
    pub validation: ValidationCatalog,
    pub rls: RlsPolicies,
    pub navigation: Navigation,
}

impl EngineSnapshot {
    /// Validate and derive. Fails on invalid metadata.
    pub fn derive(hierarchy: Arc<RoleHierarchy>, registry: Arc<EntityRegistry>) -> Result<Self, DomainError> {
        let report = validate_all(&registry, &hierarchy, ValidateOptions::throwing())?;
        let permissions = derive_permissions(&registry, &hierarchy);
        let validation = derive_validation(&registry);
        let rls = derive_rls(&registry);
        let navigation = derive_navigation(&registry, &hierarchy, &permissions);

        Ok(Self {
            hierarchy,
            registry,
            report,
            permissions,
            validation,
            rls,
            navigation,
        })
    }

    pub fn entity(&self, entity: &str) -> Option<&Arc<EntityDescriptor>> {
        self.registry.get(entity)
    }

    pub fn has_permission(&self, role: &str, entity: &str, operation: Operation) -> bool {
        self.permissions.has_permission(&self.hierarchy, role, entity, operation)
    }

    /// Scope of `role` on the entity's RLS resource.
    pub fn row_level_security(&self, role: &str, entity: &str) -> Option<RlsScope> {
        let descriptor = self.registry.get(entity)?;
        self.rls.resolve(role, descriptor.rls_resource())
    }

    pub fn composite_validation(&self, entity: &str, kind: SchemaKind) -> Option<&CompositeSchema> {
        self.validation.schema(entity, kind)
    }
}

pub struct Engine {
    provider: Arc<RoleHierarchyProvider>,
    snapshot: ArcSwap<EngineSnapshot>,
}

impl Engine {
    /// Two-phase boot: roles first, then metadata.
    pub fn boot(provider: Arc<RoleHierarchyProvider>, registry: EntityRegistry) -> Result<Self, DomainError> {
        let hierarchy = provider.hierarchy()?;
        let snapshot = EngineSnapshot::derive(hierarchy, Arc::new(registry))?;

        tracing::info!(
            entities = snapshot.registry.len(),
            roles = snapshot.hierarchy.roles().len(),
            role_source = ?provider.source(),
            "access engine booted"
        );

        Ok(Self {
            provider,
            snapshot: ArcSwap::from_pointee(snapshot),
        })
    }

    /// Re-derive from the current descriptors and the current role snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<EngineSnapshot>, DomainError> {
        let current = self.snapshot.load_full();
        let hierarchy = self.provider.hierarchy()?;
        let next = Arc::new(EngineSnapshot::derive(hierarchy, current.registry.clone())?);
        self.snapshot.store(next.clone());

        tracing::info!(entities = next.registry.len(), roles = next.hierarchy.roles().len(), "access engine reloaded");
        Ok(next)
    }

    /// Swap in new metadata (e.g. re-read from disk) and re-derive.
    pub fn replace_registry(&self, registry: EntityRegistry) -> Result<Arc<EngineSnapshot>, DomainError> {
        let hierarchy = self.provider.hierarchy()?;
        let next = Arc::new(EngineSnapshot::derive(hierarchy, Arc::new(registry))?);
        self.snapshot.store(next.clone());

        tracing::info!(entities = next.registry.len(), "entity metadata replaced");
        Ok(next)
    }

    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.snapshot.load_full()
    }

    pub fn provider(&self) -> &Arc<RoleHierarchyProvider> {
        &self.provider
    }

    pub fn hierarchy(&self) -> Arc<RoleHierarchy> {
        self.snapshot.load().hierarchy.clone()
    }

    pub fn permission_matrix(&self) -> PermissionMatrix {
        self.snapshot.load().permissions.clone()
    }

    pub fn has_permission(&self, role: &str, entity: &str, operation: Operation) -> bool {
        self.snapshot.load().has_permission(role, entity, operation)
    }

    pub fn row_level_security(&self, role: &str, entity: &str) -> Option<RlsScope> {
        self.snapshot.load().row_level_security(role, entity)
    }

    pub fn composite_validation(&self, entity: &str, kind: SchemaKind) -> Option<CompositeSchema> {
        self.snapshot.load().composite_validation(entity, kind).cloned()
    }

    pub fn navigation(&self) -> Navigation {
        self.snapshot.load().navigation.clone()
    }

    /// Navigation entries the actor may see.
    pub fn navigation_for(&self, actor: &Actor) -> Vec<NavigationEntry> {
        let snapshot = self.snapshot.load();
        snapshot
            .navigation
            .visible_to(&snapshot.hierarchy, actor.role.as_str())
            .into_iter()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("Engine")
            .field("entities", &snapshot.registry.len())
            .field("roles", &snapshot.hierarchy.roles().len())
            .finish()
    }
}
