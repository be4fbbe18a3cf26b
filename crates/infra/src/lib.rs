//! Infrastructure layer: engine composition, storage boundary, audit, config.

pub mod audit;
pub mod config;
pub mod engine;
pub mod entity_service;
pub mod storage;

/// Postgres role store.
#[cfg(feature = "postgres")]
pub mod postgres;

pub use audit::{AuditError, AuditOutcome, AuditRecord, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineSnapshot};
pub use entity_service::{EntityService, ExecuteArgs, ExecuteOutcome};
pub use storage::{InMemoryStorage, ListQuery, Page, Pagination, Record, StorageAdapter, StorageError};
