//! Audit trail of mutating operations.
//!
//! Writing an audit record is best-effort: the entity service logs a failed
//! write and carries on, so a broken sink never fails a business operation.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use fieldops_core::{Operation, RecordId, UserId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: UserId,
    pub action: Operation,
    pub resource_type: String,
    pub resource_id: Option<RecordId>,
    /// Row before the change (update, delete).
    pub old_values: Option<JsonValue>,
    /// Row after the change (create, update).
    pub new_values: Option<JsonValue>,
    pub outcome: AuditOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(actor_id: UserId, action: Operation, resource_type: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            id: Uuid::now_v7(),
            actor_id,
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            old_values: None,
            new_values: None,
            outcome,
            recorded_at: Utc::now(),
        }
    }

    pub fn resource(mut self, id: Option<RecordId>) -> Self {
        self.resource_id = id;
        self
    }

    pub fn snapshots(mut self, old_values: Option<JsonValue>, new_values: Option<JsonValue>) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit record rejected: {0}")]
    Rejected(String),
}

/// Destination of audit records.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, record: AuditRecord) -> Result<(), AuditError>;
}

#[async_trait::async_trait]
impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    async fn log(&self, record: AuditRecord) -> Result<(), AuditError> {
        (**self).log(record).await
    }
}

/// Keeps records in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn log(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records
            .write()
            .map_err(|_| AuditError::Unavailable("lock poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait::async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, record: AuditRecord) -> Result<(), AuditError> {
        let snapshot = serde_json::to_string(&record).map_err(|e| AuditError::Rejected(e.to_string()))?;
        tracing::info!(
            target: "fieldops::audit",
            audit_id = %record.id,
            actor_id = %record.actor_id,
            action = %record.action,
            resource_type = %record.resource_type,
            outcome = ?record.outcome,
            record = %snapshot,
            "audit"
        );
        Ok(())
    }
}
