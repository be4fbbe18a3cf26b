use serde::{Deserialize, Serialize};

use fieldops_core::{RecordId, UserId};

use crate::Role;

/// The authenticated caller of an engine operation.
///
/// Built by the transport layer from verified token claims; this crate never
/// looks at tokens itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,

    /// Customer or technician profile linked to the user, if any.
    ///
    /// Ownership-based row scopes compare record columns against this id.
    pub profile_id: Option<RecordId>,
}

impl Actor {
    pub fn new(id: UserId, role: impl Into<Role>) -> Self {
        Self {
            id,
            role: role.into(),
            profile_id: None,
        }
    }

    pub fn with_profile(mut self, profile_id: RecordId) -> Self {
        self.profile_id = Some(profile_id);
        self
    }
}
