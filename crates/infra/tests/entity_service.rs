use std::sync::{Arc, Mutex};

use serde_json::{json, Value as JsonValue};

use fieldops_auth::{Actor, RlsContext, RoleHierarchyProvider};
use fieldops_core::{DomainError, Operation, RecordId, UserId};
use fieldops_infra::{
    AuditError, AuditOutcome, AuditRecord, AuditSink, Engine, EntityService, ExecuteArgs, InMemoryAuditSink,
    InMemoryStorage, ListQuery, Page, Pagination, Record, StorageAdapter, StorageError,
};
use fieldops_metadata::{EntityDescriptor, EntityRegistry};

/// Wraps the in-memory adapter and records which methods were called.
#[derive(Default)]
struct RecordingStorage {
    inner: InMemoryStorage,
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingStorage {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn note(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl StorageAdapter for RecordingStorage {
    async fn find_all(&self, e: &EntityDescriptor, q: &ListQuery, rls: &RlsContext) -> Result<Page, StorageError> {
        self.note("find_all");
        self.inner.find_all(e, q, rls).await
    }

    async fn find_by_id(
        &self,
        e: &EntityDescriptor,
        id: RecordId,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError> {
        self.note("find_by_id");
        self.inner.find_by_id(e, id, rls).await
    }

    async fn find_by_field(
        &self,
        e: &EntityDescriptor,
        field: &str,
        value: &JsonValue,
        rls: &RlsContext,
    ) -> Result<Vec<Record>, StorageError> {
        self.note("find_by_field");
        self.inner.find_by_field(e, field, value, rls).await
    }

    async fn create(&self, e: &EntityDescriptor, data: Record, rls: &RlsContext) -> Result<Record, StorageError> {
        self.note("create");
        self.inner.create(e, data, rls).await
    }

    async fn update(
        &self,
        e: &EntityDescriptor,
        id: RecordId,
        data: Record,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError> {
        self.note("update");
        self.inner.update(e, id, data, rls).await
    }

    async fn delete(
        &self,
        e: &EntityDescriptor,
        id: RecordId,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError> {
        self.note("delete");
        self.inner.delete(e, id, rls).await
    }
}

struct BrokenAuditSink;

#[async_trait::async_trait]
impl AuditSink for BrokenAuditSink {
    async fn log(&self, _record: AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("audit database down".to_string()))
    }
}

type Service = EntityService<Arc<RecordingStorage>, Arc<InMemoryAuditSink>>;

fn engine() -> Arc<Engine> {
    Arc::new(
        Engine::boot(
            Arc::new(RoleHierarchyProvider::for_tests()),
            EntityRegistry::builtin().unwrap(),
        )
        .unwrap(),
    )
}

fn service() -> (Service, Arc<RecordingStorage>, Arc<InMemoryAuditSink>) {
    let storage = Arc::new(RecordingStorage::default());
    let audit = Arc::new(InMemoryAuditSink::new());
    (EntityService::new(engine(), storage.clone(), audit.clone()), storage, audit)
}

fn admin() -> Actor {
    Actor::new(UserId::new(1), "admin")
}

fn id_of(record: &Record) -> RecordId {
    RecordId::from_json(&record["id"]).unwrap()
}

async fn seed_customer(service: &Service, email: &str) -> RecordId {
    let record = service
        .create(
            "customer",
            &admin(),
            json!({ "email": email, "first_name": "Ada", "last_name": "Lovelace" }),
        )
        .await
        .unwrap();
    id_of(&record)
}

async fn seed_work_order(service: &Service, customer: RecordId, title: &str) -> RecordId {
    let record = service
        .create("work_order", &admin(), json!({ "title": title, "customer_id": customer }))
        .await
        .unwrap();
    id_of(&record)
}

#[tokio::test]
async fn unauthorized_delete_never_reaches_storage() {
    let (service, storage, audit) = service();
    let customer = seed_customer(&service, "ada@example.com").await;
    let calls_before = storage.calls().len();

    let technician = Actor::new(UserId::new(7), "technician");
    let err = service.delete("customer", &technician, customer).await.unwrap_err();

    assert_eq!(err, DomainError::Unauthorized);
    assert_eq!(storage.calls().len(), calls_before);
    assert!(!storage.calls().contains(&"delete"));
    assert_eq!(storage.inner.count("customers"), 1);
    assert_eq!(audit.records().len(), 1);
}

#[tokio::test]
async fn disabled_operations_and_unknown_entities_are_unauthorized() {
    let (service, storage, _) = service();

    let err = service
        .create("audit_log", &admin(), json!({ "action": "create" }))
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::Unauthorized);

    let err = service
        .find_all("spaceship", &admin(), ListQuery::default())
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::Unauthorized);
    assert!(storage.calls().is_empty());
}

#[tokio::test]
async fn crud_round_trip_is_audited() {
    let (service, _, audit) = service();
    let dispatcher = Actor::new(UserId::new(3), "dispatcher");
    let manager = Actor::new(UserId::new(4), "manager");

    let created = service
        .create(
            "customer",
            &dispatcher,
            json!({ "email": "grace@example.com", "first_name": "Grace", "last_name": "Hopper", "shoe_size": 9 }),
        )
        .await
        .unwrap();
    let id = id_of(&created);
    assert_eq!(created["status"], json!("pending"));
    assert!(!created.contains_key("shoe_size"));

    let updated = service
        .update("customer", &dispatcher, id, json!({ "phone": "+1 555 123 4567" }))
        .await
        .unwrap();
    assert_eq!(updated["phone"], json!("+1 555 123 4567"));
    assert_eq!(updated["email"], json!("grace@example.com"));

    let read = service.find_by_id("customer", &dispatcher, id).await.unwrap();
    assert_eq!(read, updated);

    let deleted = service.delete("customer", &manager, id).await.unwrap();
    assert_eq!(deleted["email"], json!("grace@example.com"));
    assert_eq!(
        service.find_by_id("customer", &dispatcher, id).await.unwrap_err(),
        DomainError::NotFound
    );

    let records = audit.records();
    let actions: Vec<Operation> = records.iter().map(|r| r.action).collect();
    assert_eq!(actions, [Operation::Create, Operation::Update, Operation::Delete]);
    assert!(records.iter().all(|r| r.outcome == AuditOutcome::Success));
    assert!(records.iter().all(|r| r.resource_type == "customers" && r.resource_id == Some(id)));

    assert_eq!(records[0].actor_id, UserId::new(3));
    assert!(records[0].old_values.is_none());
    assert!(records[1].old_values.as_ref().unwrap().get("phone").is_none());
    assert_eq!(records[1].new_values.as_ref().unwrap()["phone"], json!("+1 555 123 4567"));
    assert_eq!(records[2].actor_id, UserId::new(4));
    assert!(records[2].new_values.is_none());
    assert_eq!(records[2].old_values.as_ref().unwrap()["email"], json!("grace@example.com"));
}

#[tokio::test]
async fn customers_only_see_their_own_work_orders() {
    let (service, _, _) = service();
    let mine = seed_customer(&service, "mine@example.com").await;
    let theirs = seed_customer(&service, "theirs@example.com").await;
    let my_order = seed_work_order(&service, mine, "Leaking tap").await;
    let their_order = seed_work_order(&service, theirs, "Broken heater").await;

    let customer = Actor::new(UserId::new(20), "customer").with_profile(mine);

    let page = service
        .find_all("work_order", &customer, ListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(id_of(&page.records[0]), my_order);

    assert_eq!(
        service.find_by_id("work_order", &customer, their_order).await.unwrap_err(),
        DomainError::NotFound
    );
    assert_eq!(
        service
            .update("work_order", &customer, their_order, json!({ "description": "mine now" }))
            .await
            .unwrap_err(),
        DomainError::NotFound
    );

    // Creating on someone else's behalf falls outside the scope.
    assert_eq!(
        service
            .create("work_order", &customer, json!({ "title": "Sneaky", "customer_id": theirs }))
            .await
            .unwrap_err(),
        DomainError::Unauthorized
    );
    service
        .create("work_order", &customer, json!({ "title": "Second job", "customer_id": mine }))
        .await
        .unwrap();

    let unlinked = Actor::new(UserId::new(21), "customer");
    let page = service
        .find_all("work_order", &unlinked, ListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn updates_cannot_hand_a_row_to_another_owner() {
    let (service, storage, audit) = service();
    let mine = seed_customer(&service, "keep@example.com").await;
    let theirs = seed_customer(&service, "other@example.com").await;
    let order = seed_work_order(&service, mine, "Gutter cleaning").await;
    let audited_before = audit.records().len();

    let customer = Actor::new(UserId::new(20), "customer").with_profile(mine);
    let err = service
        .update("work_order", &customer, order, json!({ "customer_id": theirs }))
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::Unauthorized);
    assert!(!storage.calls().contains(&"update"));
    assert_eq!(audit.records().len(), audited_before);

    let row = service.find_by_id("work_order", &customer, order).await.unwrap();
    assert_eq!(row["customer_id"], json!(mine));

    let other = Actor::new(UserId::new(22), "customer").with_profile(theirs);
    let page = service
        .find_all("work_order", &other, ListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);

    // Staying in scope is fine.
    let updated = service
        .update("work_order", &customer, order, json!({ "description": "Front and back" }))
        .await
        .unwrap();
    assert_eq!(updated["description"], json!("Front and back"));
}

#[tokio::test]
async fn technicians_cannot_see_or_create_invoices() {
    let (service, storage, _) = service();
    let technician = Actor::new(UserId::new(9), "technician").with_profile(RecordId::new(1));

    // Read is granted by the matrix but the row scope is deny_all.
    let page = service
        .find_all("invoice", &technician, ListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert_eq!(storage.calls(), ["find_all"]);

    assert_eq!(
        service
            .create("invoice", &technician, json!({ "invoice_number": "INV-0001" }))
            .await
            .unwrap_err(),
        DomainError::Unauthorized
    );
}

#[tokio::test]
async fn storage_constraints_map_to_domain_errors() {
    let (service, _, audit) = service();
    seed_customer(&service, "dup@example.com").await;

    let err = service
        .create(
            "customer",
            &admin(),
            json!({ "email": "dup@example.com", "first_name": "B", "last_name": "C" }),
        )
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::conflict("a record with this email already exists"));

    let err = service
        .create("work_order", &admin(), json!({ "title": "Orphan", "customer_id": 99 }))
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::reference("customer_id"));

    let failures: Vec<AuditRecord> = audit
        .records()
        .into_iter()
        .filter(|r| r.outcome == AuditOutcome::Failure)
        .collect();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].resource_type, "customers");
    assert_eq!(failures[1].resource_type, "work_orders");
}

#[tokio::test]
async fn registered_dependents_block_delete() {
    let (service, storage, _) = service();
    let customer = seed_customer(&service, "owner@example.com").await;
    seed_work_order(&service, customer, "Install meter").await;

    let err = service.delete("customer", &admin(), customer).await.unwrap_err();
    assert!(matches!(&err, DomainError::Conflict(msg) if msg.contains("work_order")));
    assert!(!storage.calls().contains(&"delete"));
    assert_eq!(storage.inner.count("customers"), 1);
}

#[tokio::test]
async fn validation_reports_every_violation_before_storage() {
    let (service, storage, _) = service();

    let err = service
        .create("customer", &admin(), json!({ "email": "not-an-email", "phone": "call me" }))
        .await
        .unwrap_err();

    let mut fields: Vec<&str> = err.violations().iter().map(|v| v.field.as_str()).collect();
    fields.sort_unstable();
    fields.dedup();
    assert_eq!(fields, ["email", "first_name", "last_name", "phone"]);
    assert!(!storage.calls().contains(&"create"));
}

#[tokio::test]
async fn list_queries_are_checked_against_entity_metadata() {
    let (service, _, _) = service();
    let customer = seed_customer(&service, "list@example.com").await;
    seed_work_order(&service, customer, "Replace filter").await;
    seed_work_order(&service, customer, "Replace pump").await;
    seed_work_order(&service, customer, "Inspect roof").await;

    let page = service
        .find_all("work_order", &admin(), ListQuery::default().search("replace").page(1, 0))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.records.len(), 1);
    assert!(page.has_more);

    let err = service
        .find_all("work_order", &admin(), ListQuery::default().filter("internal_notes", "x"))
        .await
        .unwrap_err();
    assert_eq!(err.violations()[0].field, "internal_notes");
}

#[tokio::test]
async fn oversized_page_requests_are_capped_before_storage() {
    let (service, _, _) = service();
    let customer = seed_customer(&service, "cap@example.com").await;
    seed_work_order(&service, customer, "Only job").await;

    let wide = ListQuery {
        pagination: Pagination { limit: u32::MAX, offset: 0 },
        ..ListQuery::default()
    };
    let page = service.find_all("work_order", &admin(), wide).await.unwrap();
    assert_eq!(page.pagination.limit, Pagination::MAX_LIMIT);
    assert_eq!(page.records.len(), 1);

    let parsed: ListQuery = serde_json::from_value(json!({ "pagination": { "limit": 50_000 } })).unwrap();
    let page = service.find_all("work_order", &admin(), parsed).await.unwrap();
    assert_eq!(page.pagination.limit, Pagination::MAX_LIMIT);
}

#[tokio::test]
async fn broken_audit_sink_does_not_fail_operations() {
    let storage = Arc::new(RecordingStorage::default());
    let service = EntityService::new(engine(), storage.clone(), BrokenAuditSink);

    let record = service
        .create(
            "customer",
            &admin(),
            json!({ "email": "quiet@example.com", "first_name": "Q", "last_name": "Uiet" }),
        )
        .await
        .unwrap();
    assert_eq!(record["email"], json!("quiet@example.com"));
    assert_eq!(storage.inner.count("customers"), 1);
}

#[tokio::test]
async fn execute_requires_arguments_per_operation() {
    let (service, _, _) = service();

    let err = service
        .execute("customer", Operation::Delete, &admin(), ExecuteArgs::default())
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::invalid_field("id", "is required"));

    let err = service
        .execute("customer", Operation::Create, &admin(), ExecuteArgs::default())
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::invalid_field("payload", "is required"));
}
