use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use fieldops_auth::RlsContext;
use fieldops_core::{DomainError, RecordId};
use fieldops_metadata::EntityDescriptor;

use super::query::{ListQuery, Page};

/// One stored row: column name -> JSON value.
pub type Record = Map<String, JsonValue>;

/// Storage operation error.
///
/// Adapters classify backend failures into these variants so the entity
/// service can translate them without knowing the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("unique constraint violated on {table}.{field}")]
    UniqueViolation { table: String, field: String },

    #[error("foreign key {table}.{field} references a missing record")]
    ForeignKeyViolation { table: String, field: String },

    #[error("row in {table} would leave the caller's scope")]
    OutOfScope { table: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StorageError> for DomainError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::UniqueViolation { field, .. } => {
                DomainError::conflict(format!("a record with this {field} already exists"))
            }
            StorageError::ForeignKeyViolation { field, .. } => DomainError::reference(field),
            StorageError::OutOfScope { .. } => DomainError::Unauthorized,
            StorageError::Backend(msg) => DomainError::storage(msg),
        }
    }
}

/// Persistence boundary of the generic entity service.
///
/// Every call carries the caller's [`RlsContext`]; adapters must restrict
/// reads, updates and deletes to the rows the scope admits. A target row
/// outside the scope is reported exactly like a missing one (`None`).
#[async_trait::async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn find_all(
        &self,
        entity: &EntityDescriptor,
        query: &ListQuery,
        rls: &RlsContext,
    ) -> Result<Page, StorageError>;

    async fn find_by_id(
        &self,
        entity: &EntityDescriptor,
        id: RecordId,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError>;

    async fn find_by_field(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        value: &JsonValue,
        rls: &RlsContext,
    ) -> Result<Vec<Record>, StorageError>;

    async fn create(
        &self,
        entity: &EntityDescriptor,
        data: Record,
        rls: &RlsContext,
    ) -> Result<Record, StorageError>;

    /// Returns the updated row, or `None` when no row in scope matched.
    async fn update(
        &self,
        entity: &EntityDescriptor,
        id: RecordId,
        data: Record,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError>;

    /// Returns the deleted row, or `None` when no row in scope matched.
    async fn delete(
        &self,
        entity: &EntityDescriptor,
        id: RecordId,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError>;
}

#[async_trait::async_trait]
impl<S> StorageAdapter for Arc<S>
where
    S: StorageAdapter + ?Sized,
{
    async fn find_all(
        &self,
        entity: &EntityDescriptor,
        query: &ListQuery,
        rls: &RlsContext,
    ) -> Result<Page, StorageError> {
        (**self).find_all(entity, query, rls).await
    }

    async fn find_by_id(
        &self,
        entity: &EntityDescriptor,
        id: RecordId,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError> {
        (**self).find_by_id(entity, id, rls).await
    }

    async fn find_by_field(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        value: &JsonValue,
        rls: &RlsContext,
    ) -> Result<Vec<Record>, StorageError> {
        (**self).find_by_field(entity, field, value, rls).await
    }

    async fn create(
        &self,
        entity: &EntityDescriptor,
        data: Record,
        rls: &RlsContext,
    ) -> Result<Record, StorageError> {
        (**self).create(entity, data, rls).await
    }

    async fn update(
        &self,
        entity: &EntityDescriptor,
        id: RecordId,
        data: Record,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError> {
        (**self).update(entity, id, data, rls).await
    }

    async fn delete(
        &self,
        entity: &EntityDescriptor,
        id: RecordId,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError> {
        (**self).delete(entity, id, rls).await
    }
}
