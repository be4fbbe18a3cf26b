//! `fieldops-auth` — roles, authorization primitives and row-scope vocabulary.
//!
//! This crate is intentionally decoupled from HTTP, storage and metadata.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod rls;
pub mod roles;

pub use authorize::{authorize, explain_authorization, AuthorizationExplanation, AuthzError};
pub use permissions::{PermissionEntry, PermissionMatrix};
pub use principal::Actor;
pub use rls::{RlsContext, RlsScope, ScopeFilterBuilder, UnknownScope};
pub use roles::{
    Role, RoleDefinition, RoleHierarchy, RoleHierarchyProvider, RoleRow, RoleSource, RoleStore,
    RoleStoreError, StaticRoleStore, ACCESS_NONE, ACCESS_SYSTEM, BOOTSTRAP_ROLES,
};
