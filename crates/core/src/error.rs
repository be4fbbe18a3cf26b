//! Domain error model.

use serde::Serialize;
use thiserror::Error;

/// Result type used across the engine.
pub type DomainResult<T> = Result<T, DomainError>;

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl core::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Engine-level error.
///
/// Every failure the generic CRUD path can surface to a caller maps onto one of
/// these variants. Storage and audit failures are translated before they get
/// here; opaque backend failures end up in `Storage`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed metadata or a startup-ordering mistake. Fatal at boot.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The actor may not perform the operation (insufficient role, or the
    /// operation is disabled). Carries no payload on purpose.
    #[error("unauthorized")]
    Unauthorized,

    /// The payload failed the derived schema. Holds every violation.
    #[error("validation failed: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),

    /// Uniqueness violation reported by storage.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Foreign-key violation reported by storage.
    #[error("references missing related record: {0}")]
    Reference(String),

    /// The target record does not exist (or is outside the actor's scope).
    #[error("not found")]
    NotFound,

    /// Storage failed in a way the engine cannot classify.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        Self::Validation(violations)
    }

    /// Single-field validation failure.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn reference(msg: impl Into<String>) -> Self {
        Self::Reference(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Field violations carried by a validation error (empty otherwise).
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            Self::Validation(v) => v,
            _ => &[],
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Unauthorized => "unauthorized",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::Reference(_) => "reference_error",
            Self::NotFound => "not_found",
            Self::Storage(_) => "storage_error",
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
