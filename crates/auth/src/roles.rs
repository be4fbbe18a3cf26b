//! Roles and the role-hierarchy provider.
//!
//! Roles form a strict total order by priority (lowest privilege first). The
//! provider owns the process-wide snapshot of that order. Boot is explicit:
//! callers initialize from a [`RoleStore`] (or from the bootstrap constants)
//! before anything reads the hierarchy.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fieldops_core::DomainError;

/// Access value meaning "no role may touch this".
pub const ACCESS_NONE: &str = "none";

/// Access value meaning "internal/system code only, never an API actor".
pub const ACCESS_SYSTEM: &str = "system";

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Role {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A role with its rank in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub role: Role,
    pub priority: u32,
    pub description: Option<String>,
}

/// Row shape returned by a role store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRow {
    pub name: String,
    pub priority: i64,
    pub description: Option<String>,
    pub is_active: bool,
}

/// Bootstrap role constants (lowest privilege first).
pub const BOOTSTRAP_ROLES: [(&str, u32, &str); 5] = [
    ("customer", 1, "Customer with access to their own records"),
    ("technician", 2, "Field technician working assigned work orders"),
    ("dispatcher", 3, "Dispatcher scheduling and assigning work"),
    ("manager", 4, "Business manager with broad operational access"),
    ("admin", 5, "Full system administrator"),
];

/// Immutable, ordered role snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHierarchy {
    /// Sorted by ascending priority.
    roles: Vec<RoleDefinition>,
}

impl RoleHierarchy {
    /// Build a hierarchy, enforcing unique names and unique positive priorities.
    pub fn new(mut roles: Vec<RoleDefinition>) -> Result<Self, DomainError> {
        if roles.is_empty() {
            return Err(DomainError::configuration("role hierarchy is empty"));
        }

        roles.sort_by_key(|r| r.priority);

        let mut names = HashSet::new();
        let mut last: Option<u32> = None;
        for def in &roles {
            if def.priority == 0 {
                return Err(DomainError::configuration(format!(
                    "role '{}' has non-positive priority",
                    def.role
                )));
            }
            if last == Some(def.priority) {
                return Err(DomainError::configuration(format!(
                    "duplicate role priority {}",
                    def.priority
                )));
            }
            if !names.insert(def.role.as_str().to_string()) {
                return Err(DomainError::configuration(format!(
                    "duplicate role name '{}'",
                    def.role
                )));
            }
            last = Some(def.priority);
        }

        Ok(Self { roles })
    }

    /// Hierarchy built from [`BOOTSTRAP_ROLES`].
    pub fn bootstrap() -> Self {
        let roles = BOOTSTRAP_ROLES
            .iter()
            .map(|(name, priority, description)| RoleDefinition {
                role: Role::new(*name),
                priority: *priority,
                description: Some((*description).to_string()),
            })
            .collect();
        Self { roles }
    }

    /// Build a hierarchy from store rows; inactive rows are ignored.
    pub fn from_rows(rows: Vec<RoleRow>) -> Result<Self, DomainError> {
        let mut roles = Vec::with_capacity(rows.len());
        for row in rows.into_iter().filter(|r| r.is_active) {
            let priority = u32::try_from(row.priority)
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| {
                    DomainError::configuration(format!(
                        "role '{}' has invalid priority {}",
                        row.name, row.priority
                    ))
                })?;
            roles.push(RoleDefinition {
                role: Role::new(row.name),
                priority,
                description: row.description,
            });
        }

        if roles.is_empty() {
            return Err(DomainError::configuration(
                "role store returned zero active roles",
            ));
        }

        Self::new(roles)
    }

    /// Roles ordered lowest to highest privilege.
    pub fn roles(&self) -> &[RoleDefinition] {
        &self.roles
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.role.as_str())
    }

    pub fn priority(&self, name: &str) -> Option<u32> {
        self.roles
            .iter()
            .find(|r| r.role.as_str() == name)
            .map(|r| r.priority)
    }

    pub fn by_priority(&self, priority: u32) -> Option<&RoleDefinition> {
        self.roles.iter().find(|r| r.priority == priority)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.priority(name).is_some()
    }

    pub fn lowest(&self) -> &RoleDefinition {
        &self.roles[0]
    }

    pub fn highest(&self) -> &RoleDefinition {
        &self.roles[self.roles.len() - 1]
    }

    /// Values accepted in `fieldAccess`: `none`, `system`, or any role name.
    ///
    /// Computed from the current hierarchy, so a new role becomes a valid
    /// access target without touching the validator.
    pub fn valid_access_values(&self) -> Vec<String> {
        let mut values = vec![ACCESS_NONE.to_string(), ACCESS_SYSTEM.to_string()];
        values.extend(self.role_names().map(str::to_string));
        values
    }

    /// `{role: priority}` view, handy for diagnostics.
    pub fn priorities(&self) -> BTreeMap<String, u32> {
        self.roles
            .iter()
            .map(|r| (r.role.as_str().to_string(), r.priority))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum RoleStoreError {
    #[error("role store unavailable: {0}")]
    Unavailable(String),

    #[error("role store query failed: {0}")]
    Query(String),
}

/// Read-only source of role rows (consulted once at boot).
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    async fn load_roles(&self) -> Result<Vec<RoleRow>, RoleStoreError>;
}

#[async_trait::async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    async fn load_roles(&self) -> Result<Vec<RoleRow>, RoleStoreError> {
        (**self).load_roles().await
    }
}

/// Static role store (tests, seeded deployments).
#[derive(Debug, Clone, Default)]
pub struct StaticRoleStore {
    rows: Vec<RoleRow>,
}

impl StaticRoleStore {
    pub fn new(rows: Vec<RoleRow>) -> Self {
        Self { rows }
    }
}

#[async_trait::async_trait]
impl RoleStore for StaticRoleStore {
    async fn load_roles(&self) -> Result<Vec<RoleRow>, RoleStoreError> {
        Ok(self.rows.clone())
    }
}

/// Where the current snapshot came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    Store,
    Fallback,
}

#[derive(Debug, Clone)]
enum ProviderState {
    Uninitialized,
    Ready {
        hierarchy: Arc<RoleHierarchy>,
        source: RoleSource,
    },
}

/// Process-wide owner of the role hierarchy snapshot.
///
/// Accessors fail with a startup-ordering error until one of the initializers
/// has run. A provider built with [`RoleHierarchyProvider::for_tests`] instead
/// initializes itself from the bootstrap constants on first access.
#[derive(Debug)]
pub struct RoleHierarchyProvider {
    state: RwLock<ProviderState>,
    test_mode: bool,
}

impl Default for RoleHierarchyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleHierarchyProvider {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ProviderState::Uninitialized),
            test_mode: false,
        }
    }

    /// Provider that silently falls back to bootstrap roles when read before
    /// initialization.
    pub fn for_tests() -> Self {
        Self {
            state: RwLock::new(ProviderState::Uninitialized),
            test_mode: true,
        }
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    /// Load roles from the store and freeze them as the current snapshot.
    pub async fn initialize_from_store<S>(&self, store: &S) -> Result<Arc<RoleHierarchy>, DomainError>
    where
        S: RoleStore + ?Sized,
    {
        let rows = store
            .load_roles()
            .await
            .map_err(|e| DomainError::configuration(e.to_string()))?;
        let hierarchy = Arc::new(RoleHierarchy::from_rows(rows)?);

        tracing::info!(
            roles = ?hierarchy.priorities(),
            "role hierarchy loaded from store"
        );
        self.set(hierarchy.clone(), RoleSource::Store)?;
        Ok(hierarchy)
    }

    /// Load the bootstrap constants as the current snapshot.
    pub fn initialize_from_fallback(&self) -> Result<Arc<RoleHierarchy>, DomainError> {
        let hierarchy = Arc::new(RoleHierarchy::bootstrap());
        if !self.test_mode {
            tracing::warn!("role hierarchy initialized from bootstrap constants; store-backed roles are not in effect");
        }
        self.set(hierarchy.clone(), RoleSource::Fallback)?;
        Ok(hierarchy)
    }

    /// Current snapshot.
    pub fn hierarchy(&self) -> Result<Arc<RoleHierarchy>, DomainError> {
        if let Some((hierarchy, _)) = self.current() {
            return Ok(hierarchy);
        }
        if self.test_mode {
            return self.initialize_from_fallback();
        }
        Err(DomainError::configuration(
            "role hierarchy accessed before initialization; initialize roles before loading metadata",
        ))
    }

    pub fn priority(&self, name: &str) -> Result<Option<u32>, DomainError> {
        Ok(self.hierarchy()?.priority(name))
    }

    pub fn by_priority(&self, priority: u32) -> Result<Option<RoleDefinition>, DomainError> {
        Ok(self.hierarchy()?.by_priority(priority).cloned())
    }

    pub fn role_names(&self) -> Result<Vec<String>, DomainError> {
        Ok(self.hierarchy()?.role_names().map(str::to_string).collect())
    }

    /// `None` while uninitialized.
    pub fn source(&self) -> Option<RoleSource> {
        self.current().map(|(_, source)| source)
    }

    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    /// Forget the snapshot; the next access must re-initialize.
    pub fn clear_cache(&self) -> Result<(), DomainError> {
        *self.state.write().map_err(|_| poisoned())? = ProviderState::Uninitialized;
        Ok(())
    }

    fn current(&self) -> Option<(Arc<RoleHierarchy>, RoleSource)> {
        let state = self.state.read().ok()?;
        match &*state {
            ProviderState::Ready { hierarchy, source } => Some((hierarchy.clone(), *source)),
            ProviderState::Uninitialized => None,
        }
    }

    fn set(&self, hierarchy: Arc<RoleHierarchy>, source: RoleSource) -> Result<(), DomainError> {
        *self.state.write().map_err(|_| poisoned())? = ProviderState::Ready { hierarchy, source };
        Ok(())
    }
}

fn poisoned() -> DomainError {
    DomainError::configuration("role hierarchy lock poisoned; roles were not stored")
}
