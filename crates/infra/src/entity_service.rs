//! Generic CRUD execution path.
//!
//! Every entity runs through the same pipeline:
//!
//! ```text
//! request (entity, operation, actor, args)
//!   ↓
//! 1. Permission check against the derived matrix (fails before any IO)
//!   ↓
//! 2. Row scope for (actor role, entity RLS resource); missing = deny_all
//!   ↓
//! 3. Payload / list query validation against the derived schema
//!   ↓
//! 4. Delete guard: registered dependents must not reference the row
//!   ↓
//! 5. Storage call carrying the row scope
//!   ↓
//! 6. Best-effort audit of mutations (success and failure)
//! ```

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::instrument;

use fieldops_auth::{authorize, explain_authorization, Actor, RlsContext, RlsScope};
use fieldops_core::{DomainError, FieldViolation, Operation, RecordId};
use fieldops_metadata::{EntityDescriptor, SchemaKind};

use crate::audit::{AuditOutcome, AuditRecord, AuditSink};
use crate::engine::{Engine, EngineSnapshot};
use crate::storage::{ListQuery, Page, Record, RowFilterBuilder, StorageAdapter, StorageError};

/// Arguments of one execution; which ones matter depends on the operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteArgs {
    pub id: Option<RecordId>,
    pub payload: Option<JsonValue>,
    pub query: Option<ListQuery>,
}

impl ExecuteArgs {
    pub fn id(id: RecordId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn payload(payload: JsonValue) -> Self {
        Self {
            payload: Some(payload),
            ..Default::default()
        }
    }

    pub fn query(query: ListQuery) -> Self {
        Self {
            query: Some(query),
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    /// Single row: read by id, created, updated or deleted.
    Record(Record),
    /// List read.
    Page(Page),
}

impl ExecuteOutcome {
    pub fn into_record(self) -> Option<Record> {
        match self {
            ExecuteOutcome::Record(r) => Some(r),
            ExecuteOutcome::Page(_) => None,
        }
    }

    pub fn into_page(self) -> Option<Page> {
        match self {
            ExecuteOutcome::Page(p) => Some(p),
            ExecuteOutcome::Record(_) => None,
        }
    }
}

/// The one CRUD service every entity goes through.
pub struct EntityService<S, A> {
    engine: Arc<Engine>,
    storage: S,
    audit: A,
}

impl<S, A> EntityService<S, A>
where
    S: StorageAdapter,
    A: AuditSink,
{
    pub fn new(engine: Arc<Engine>, storage: S, audit: A) -> Self {
        Self { engine, storage, audit }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[instrument(
        skip(self, actor, args),
        fields(actor_id = %actor.id, role = %actor.role),
        err(Display)
    )]
    pub async fn execute(
        &self,
        entity: &str,
        operation: Operation,
        actor: &Actor,
        args: ExecuteArgs,
    ) -> Result<ExecuteOutcome, DomainError> {
        let snapshot = self.engine.snapshot();

        if let Err(denied) = authorize(&snapshot.hierarchy, &snapshot.permissions, actor, entity, operation) {
            let explanation = explain_authorization(
                &snapshot.hierarchy,
                &snapshot.permissions,
                actor,
                entity,
                operation,
            );
            tracing::debug!(reason = %denied, explanation = %explanation.reason, "authorization denied");
            return Err(denied.into());
        }

        let descriptor = snapshot.entity(entity).cloned().ok_or(DomainError::Unauthorized)?;
        let rls = self.row_scope(&snapshot, actor, &descriptor);

        match operation {
            Operation::Read => self.read_rows(&descriptor, &rls, args).await,
            Operation::Create => self.create_row(&snapshot, &descriptor, actor, &rls, args).await,
            Operation::Update => self.update_row(&snapshot, &descriptor, actor, &rls, args).await,
            Operation::Delete => self.delete_row(&snapshot, &descriptor, actor, &rls, args).await,
        }
    }

    pub async fn find_all(&self, entity: &str, actor: &Actor, query: ListQuery) -> Result<Page, DomainError> {
        self.execute(entity, Operation::Read, actor, ExecuteArgs::query(query))
            .await?
            .into_page()
            .ok_or_else(|| DomainError::storage("list read returned a single record"))
    }

    pub async fn find_by_id(&self, entity: &str, actor: &Actor, id: RecordId) -> Result<Record, DomainError> {
        self.single(entity, Operation::Read, actor, ExecuteArgs::id(id)).await
    }

    pub async fn create(&self, entity: &str, actor: &Actor, payload: JsonValue) -> Result<Record, DomainError> {
        self.single(entity, Operation::Create, actor, ExecuteArgs::payload(payload)).await
    }

    pub async fn update(
        &self,
        entity: &str,
        actor: &Actor,
        id: RecordId,
        payload: JsonValue,
    ) -> Result<Record, DomainError> {
        self.single(entity, Operation::Update, actor, ExecuteArgs::id(id).with_payload(payload))
            .await
    }

    pub async fn delete(&self, entity: &str, actor: &Actor, id: RecordId) -> Result<Record, DomainError> {
        self.single(entity, Operation::Delete, actor, ExecuteArgs::id(id)).await
    }

    async fn single(
        &self,
        entity: &str,
        operation: Operation,
        actor: &Actor,
        args: ExecuteArgs,
    ) -> Result<Record, DomainError> {
        self.execute(entity, operation, actor, args)
            .await?
            .into_record()
            .ok_or_else(|| DomainError::storage("single-record operation returned a page"))
    }

    fn row_scope(&self, snapshot: &EngineSnapshot, actor: &Actor, descriptor: &EntityDescriptor) -> RlsContext {
        let scope = match snapshot.row_level_security(actor.role.as_str(), &descriptor.entity_key) {
            Some(scope) => scope,
            None => {
                tracing::debug!(
                    entity = %descriptor.entity_key,
                    resource = descriptor.rls_resource(),
                    "no rls policy for role; denying all rows"
                );
                RlsScope::DenyAll
            }
        };
        RlsContext::new(scope, actor.id, actor.profile_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn read_rows(
        &self,
        descriptor: &EntityDescriptor,
        rls: &RlsContext,
        args: ExecuteArgs,
    ) -> Result<ExecuteOutcome, DomainError> {
        if let Some(id) = args.id {
            return self
                .storage
                .find_by_id(descriptor, id, rls)
                .await?
                .map(ExecuteOutcome::Record)
                .ok_or(DomainError::NotFound);
        }

        let mut query = args.query.unwrap_or_default();
        query.pagination = query.pagination.clamped();
        check_list_query(descriptor, &query)?;
        Ok(ExecuteOutcome::Page(self.storage.find_all(descriptor, &query, rls).await?))
    }

    async fn create_row(
        &self,
        snapshot: &EngineSnapshot,
        descriptor: &EntityDescriptor,
        actor: &Actor,
        rls: &RlsContext,
        args: ExecuteArgs,
    ) -> Result<ExecuteOutcome, DomainError> {
        if rls.scope == RlsScope::DenyAll {
            tracing::debug!(entity = %descriptor.entity_key, "create rejected by row scope");
            return Err(DomainError::Unauthorized);
        }

        let data = validate_payload(snapshot, descriptor, SchemaKind::Create, args.payload)?;

        // Owner-scoped actors may only create rows inside their own scope.
        if !rls.filter(&RowFilterBuilder::new(&descriptor.primary_key)).matches(&data) {
            tracing::debug!(entity = %descriptor.entity_key, scope = %rls.scope, "created row would fall outside scope");
            return Err(DomainError::Unauthorized);
        }

        let result = self.storage.create(descriptor, data, rls).await;
        let record = self.audited(descriptor, actor, Operation::Create, None, None, result).await?;
        Ok(ExecuteOutcome::Record(record))
    }

    async fn update_row(
        &self,
        snapshot: &EngineSnapshot,
        descriptor: &EntityDescriptor,
        actor: &Actor,
        rls: &RlsContext,
        args: ExecuteArgs,
    ) -> Result<ExecuteOutcome, DomainError> {
        let id = require_id(args.id)?;
        let data = validate_payload(snapshot, descriptor, SchemaKind::Update, args.payload)?;

        let before = self
            .storage
            .find_by_id(descriptor, id, rls)
            .await?
            .ok_or(DomainError::NotFound)?;

        // The row must still be inside the actor's scope once the change applies.
        let mut after = before.clone();
        after.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        if !rls.filter(&RowFilterBuilder::new(&descriptor.primary_key)).matches(&after) {
            tracing::debug!(entity = %descriptor.entity_key, scope = %rls.scope, %id, "updated row would fall outside scope");
            return Err(DomainError::Unauthorized);
        }

        let result = self
            .storage
            .update(descriptor, id, data, rls)
            .await
            .map(|updated| updated.ok_or(DomainError::NotFound));
        let record = self
            .audited_optional(descriptor, actor, Operation::Update, Some(id), Some(before), result)
            .await?;
        Ok(ExecuteOutcome::Record(record))
    }

    async fn delete_row(
        &self,
        snapshot: &EngineSnapshot,
        descriptor: &EntityDescriptor,
        actor: &Actor,
        rls: &RlsContext,
        args: ExecuteArgs,
    ) -> Result<ExecuteOutcome, DomainError> {
        let id = require_id(args.id)?;

        let before = self
            .storage
            .find_by_id(descriptor, id, rls)
            .await?
            .ok_or(DomainError::NotFound)?;

        self.check_dependents(snapshot, descriptor, actor, id).await?;

        let result = self
            .storage
            .delete(descriptor, id, rls)
            .await
            .map(|deleted| deleted.ok_or(DomainError::NotFound));
        let record = self
            .audited_optional(descriptor, actor, Operation::Delete, Some(id), Some(before), result)
            .await?;
        Ok(ExecuteOutcome::Record(record))
    }

    /// Refuse to delete a row that registered dependents still reference.
    async fn check_dependents(
        &self,
        snapshot: &EngineSnapshot,
        descriptor: &EntityDescriptor,
        actor: &Actor,
        id: RecordId,
    ) -> Result<(), DomainError> {
        // Dependents are counted across all rows, not only the actor's scope.
        let system = RlsContext::system(actor.id);
        let key = JsonValue::from(id);

        for dependent in &descriptor.dependents {
            let Some(child) = snapshot.entity(&dependent.entity) else {
                continue;
            };
            let rows = self
                .storage
                .find_by_field(child, &dependent.foreign_key, &key, &system)
                .await?;
            if !rows.is_empty() {
                return Err(DomainError::conflict(format!(
                    "{} {id} is referenced by {} {} record(s)",
                    descriptor.entity_key,
                    rows.len(),
                    dependent.entity
                )));
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit
    // ─────────────────────────────────────────────────────────────────────────

    async fn audited(
        &self,
        descriptor: &EntityDescriptor,
        actor: &Actor,
        operation: Operation,
        id: Option<RecordId>,
        before: Option<Record>,
        result: Result<Record, StorageError>,
    ) -> Result<Record, DomainError> {
        self.audited_optional(descriptor, actor, operation, id, before, result.map(Ok))
            .await
    }

    async fn audited_optional(
        &self,
        descriptor: &EntityDescriptor,
        actor: &Actor,
        operation: Operation,
        id: Option<RecordId>,
        before: Option<Record>,
        result: Result<Result<Record, DomainError>, StorageError>,
    ) -> Result<Record, DomainError> {
        let old_values = before.map(JsonValue::Object);

        match result {
            Ok(Ok(record)) => {
                let resource_id = id.or_else(|| record.get(&descriptor.primary_key).and_then(RecordId::from_json));
                let new_values = (operation != Operation::Delete).then(|| JsonValue::Object(record.clone()));
                let entry = AuditRecord::new(actor.id, operation, &descriptor.table_name, AuditOutcome::Success)
                    .resource(resource_id)
                    .snapshots(old_values, new_values);
                self.record_audit(entry).await;
                Ok(record)
            }
            Ok(Err(not_found)) => Err(not_found),
            Err(storage) => {
                tracing::warn!(entity = %descriptor.entity_key, %operation, error = %storage, "storage operation failed");
                let entry = AuditRecord::new(actor.id, operation, &descriptor.table_name, AuditOutcome::Failure)
                    .resource(id)
                    .snapshots(old_values, None);
                self.record_audit(entry).await;
                Err(storage.into())
            }
        }
    }

    async fn record_audit(&self, entry: AuditRecord) {
        let audit_id = entry.id;
        if let Err(e) = self.audit.log(entry).await {
            tracing::warn!(%audit_id, error = %e, "failed to write audit record");
        }
    }
}

fn require_id(id: Option<RecordId>) -> Result<RecordId, DomainError> {
    id.ok_or_else(|| DomainError::invalid_field("id", "is required"))
}

fn validate_payload(
    snapshot: &EngineSnapshot,
    descriptor: &EntityDescriptor,
    kind: SchemaKind,
    payload: Option<JsonValue>,
) -> Result<Record, DomainError> {
    let schema = snapshot
        .composite_validation(&descriptor.entity_key, kind)
        .ok_or_else(|| DomainError::configuration(format!("no {} schema for {}", kind.as_str(), descriptor.entity_key)))?;
    let payload = payload.ok_or_else(|| DomainError::invalid_field("payload", "is required"))?;
    schema.validate(&payload)
}

/// Search, filter and sort may only use the fields the entity opens for them.
fn check_list_query(descriptor: &EntityDescriptor, query: &ListQuery) -> Result<(), DomainError> {
    let mut violations = Vec::new();

    if query.search.is_some() && descriptor.searchable_fields.is_empty() {
        violations.push(FieldViolation::new("search", "entity is not searchable"));
    }
    for field in query.filters.keys() {
        if !descriptor.filterable_fields.contains(field) {
            violations.push(FieldViolation::new(field.as_str(), "is not filterable"));
        }
    }
    if let Some(sort) = &query.sort {
        if !descriptor.sortable_fields.contains(&sort.field) {
            violations.push(FieldViolation::new(sort.field.as_str(), "is not sortable"));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(DomainError::validation(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_metadata::{EntityRegistry, SortOrder, SortSpec};

    #[test]
    fn list_query_fields_must_be_opened_by_the_entity() {
        let registry = EntityRegistry::builtin().unwrap();
        let customer = registry.get("customer").unwrap();

        let ok = ListQuery::default()
            .search("ada")
            .filter("status", "active")
            .sort(SortSpec {
                field: "last_name".to_string(),
                order: SortOrder::Desc,
            });
        assert!(check_list_query(customer, &ok).is_ok());

        let bad = ListQuery::default().filter("notes", "x").sort(SortSpec {
            field: "phone".to_string(),
            order: SortOrder::Asc,
        });
        let err = check_list_query(customer, &bad).unwrap_err();
        let fields: Vec<&str> = err.violations().iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, ["notes", "phone"]);
    }

    #[test]
    fn missing_id_is_a_validation_error() {
        assert_eq!(
            require_id(None).unwrap_err(),
            DomainError::invalid_field("id", "is required")
        );
    }
}
