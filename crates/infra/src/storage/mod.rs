//! Storage boundary of the generic entity service.
//!
//! The engine never talks to a database directly: it hands the adapter the
//! entity descriptor, the sanitized arguments and the caller's row scope.

pub mod in_memory;
pub mod query;
pub mod scope;
pub mod r#trait;

pub use in_memory::InMemoryStorage;
pub use query::{ListQuery, Page, Pagination};
pub use r#trait::{Record, StorageAdapter, StorageError};
pub use scope::{RowFilter, RowFilterBuilder, SqlPredicate, SqlScopeBuilder};
