//! `fieldops-metadata` — declarative entity metadata and everything derived from it.
//!
//! Descriptors are loaded into an [`EntityRegistry`], checked by
//! [`validate_all`], then turned into the permission matrix, payload schemas,
//! RLS policies and navigation visibility. Every derivation is a pure
//! function of the registry and the current role hierarchy.

pub mod descriptor;
pub mod navigation;
pub mod permissions;
pub mod registry;
pub mod rls;
pub mod validation;
pub mod validator;

pub use descriptor::{
    Dependent, EntityDescriptor, EntityPermissions, FieldAccess, FieldDefinition, FieldType,
    ForeignKey, PermissionOverride, SortOrder, SortSpec,
};
pub use navigation::{derive_navigation, Navigation, NavigationEntry};
pub use permissions::{derive_entry, derive_permissions};
pub use registry::EntityRegistry;
pub use rls::{derive_rls, RlsPolicies};
pub use validation::{derive_validation, CompositeSchema, FieldConstraint, SchemaKind, ValidationCatalog};
pub use validator::{validate_all, ValidateOptions, ValidationReport};
