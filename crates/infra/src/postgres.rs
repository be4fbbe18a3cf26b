//! Postgres-backed role store.
//!
//! ## Error Mapping
//!
//! | SQLx error | Mapped to |
//! |------------|-----------|
//! | PoolClosed / PoolTimedOut / Io | `RoleStoreError::Unavailable` |
//! | other (including decode failures) | `RoleStoreError::Query` |

use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::instrument;

use fieldops_auth::{RoleRow, RoleStore, RoleStoreError};

/// Reads role rows from the `roles` table.
#[derive(Clone)]
pub struct PostgresRoleStore {
    pool: Arc<PgPool>,
}

impl PostgresRoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect lazily; the first query opens the connection.
    pub fn connect_lazy(database_url: &str) -> Result<Self, RoleStoreError> {
        let pool = PgPool::connect_lazy(database_url).map_err(|e| RoleStoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl RoleStore for PostgresRoleStore {
    #[instrument(skip(self), err)]
    async fn load_roles(&self) -> Result<Vec<RoleRow>, RoleStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT name, priority, description, is_active
            FROM roles
            ORDER BY priority ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_role_error("load_roles", e))?;

        rows.into_iter()
            .map(|row| {
                Ok(RoleRow {
                    name: row.try_get("name").map_err(|e| map_role_error("load_roles", e))?,
                    priority: row
                        .try_get::<i32, _>("priority")
                        .map(i64::from)
                        .map_err(|e| map_role_error("load_roles", e))?,
                    description: row
                        .try_get("description")
                        .map_err(|e| map_role_error("load_roles", e))?,
                    is_active: row
                        .try_get("is_active")
                        .map_err(|e| map_role_error("load_roles", e))?,
                })
            })
            .collect()
    }
}

fn map_role_error(operation: &str, err: sqlx::Error) -> RoleStoreError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            RoleStoreError::Unavailable(format!("{operation}: {err}"))
        }
        other => RoleStoreError::Query(format!("{operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_are_unavailable() {
        let err = map_role_error("load_roles", sqlx::Error::PoolClosed);
        assert!(matches!(err, RoleStoreError::Unavailable(ref msg) if msg.starts_with("load_roles")));
    }

    #[test]
    fn other_failures_are_query_errors() {
        let err = map_role_error("load_roles", sqlx::Error::RowNotFound);
        assert!(matches!(err, RoleStoreError::Query(_)));
    }
}
