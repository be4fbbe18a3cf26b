use serde::Serialize;
use thiserror::Error;

use fieldops_core::{DomainError, Operation};

use crate::{Actor, PermissionMatrix, RoleHierarchy};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("operation '{operation}' on '{resource}' is disabled")]
    Disabled { resource: String, operation: Operation },

    #[error("forbidden: '{operation}' on '{resource}' requires priority {required}")]
    Forbidden {
        resource: String,
        operation: Operation,
        required: u32,
    },
}

impl From<AuthzError> for DomainError {
    fn from(_: AuthzError) -> Self {
        // Callers learn only that they were rejected.
        DomainError::Unauthorized
    }
}

/// Check an actor's role against the derived matrix.
///
/// - No IO
/// - No panics
/// - Unknown roles and resources are denied
pub fn authorize(
    hierarchy: &RoleHierarchy,
    matrix: &PermissionMatrix,
    actor: &Actor,
    resource: &str,
    operation: Operation,
) -> Result<(), AuthzError> {
    let priority = hierarchy
        .priority(actor.role.as_str())
        .ok_or_else(|| AuthzError::UnknownRole(actor.role.as_str().to_string()))?;

    let entry = matrix
        .entry(resource, operation)
        .ok_or_else(|| AuthzError::UnknownResource(resource.to_string()))?;

    if entry.disabled {
        return Err(AuthzError::Disabled {
            resource: resource.to_string(),
            operation,
        });
    }

    if priority < entry.minimum_priority {
        return Err(AuthzError::Forbidden {
            resource: resource.to_string(),
            operation,
            required: entry.minimum_priority,
        });
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// Meant for operators and logs, never for the rejected caller.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub resource: String,
    pub operation: Operation,
    pub granted: bool,
    pub reason: String,
    pub actor_role: String,
    pub actor_priority: Option<u32>,
    pub required_role: Option<String>,
    pub required_priority: Option<u32>,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    UnknownRole,
    UnknownResource,
    OperationDisabled,
    InsufficientRole,
}

/// Explain why an authorization decision was made (or would be made).
pub fn explain_authorization(
    hierarchy: &RoleHierarchy,
    matrix: &PermissionMatrix,
    actor: &Actor,
    resource: &str,
    operation: Operation,
) -> AuthorizationExplanation {
    let actor_role = actor.role.as_str().to_string();
    let actor_priority = hierarchy.priority(&actor_role);
    let entry = matrix.entry(resource, operation);

    let mut explanation = AuthorizationExplanation {
        resource: resource.to_string(),
        operation,
        granted: false,
        reason: String::new(),
        actor_role: actor_role.clone(),
        actor_priority,
        required_role: entry.and_then(|e| e.minimum_role.as_ref().map(|r| r.as_str().to_string())),
        required_priority: entry.filter(|e| !e.disabled).map(|e| e.minimum_priority),
        denial_reason: None,
    };

    match authorize(hierarchy, matrix, actor, resource, operation) {
        Ok(()) => {
            explanation.granted = true;
            explanation.reason = format!(
                "Role '{}' meets the minimum role '{}' for {} on {}",
                actor_role,
                explanation.required_role.as_deref().unwrap_or("?"),
                operation,
                resource
            );
        }
        Err(err) => {
            explanation.reason = err.to_string();
            explanation.denial_reason = Some(denial_for(&err, hierarchy));
        }
    }

    explanation
}

fn denial_for(err: &AuthzError, hierarchy: &RoleHierarchy) -> DenialReason {
    match err {
        AuthzError::UnknownRole(role) => DenialReason {
            kind: DenialKind::UnknownRole,
            message: format!("Role '{role}' is not part of the role hierarchy"),
            suggestions: vec![format!(
                "Assign one of the known roles: {:?}",
                hierarchy.role_names().collect::<Vec<_>>()
            )],
        },
        AuthzError::UnknownResource(resource) => DenialReason {
            kind: DenialKind::UnknownResource,
            message: format!("No permission entry exists for '{resource}'"),
            suggestions: vec!["Check that the entity is registered in the metadata registry".to_string()],
        },
        AuthzError::Disabled { resource, operation } => DenialReason {
            kind: DenialKind::OperationDisabled,
            message: format!("'{operation}' on '{resource}' is reserved for internal use"),
            suggestions: Vec::new(),
        },
        AuthzError::Forbidden { required, .. } => {
            let granting: Vec<&str> = hierarchy
                .roles()
                .iter()
                .filter(|r| r.priority >= *required)
                .map(|r| r.role.as_str())
                .collect();
            DenialReason {
                kind: DenialKind::InsufficientRole,
                message: format!("Required priority {required} not met"),
                suggestions: vec![format!("Roles that would be granted: {granting:?}")],
            }
        }
    }
}
