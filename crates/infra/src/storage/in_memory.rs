use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value as JsonValue;

use fieldops_auth::RlsContext;
use fieldops_core::RecordId;
use fieldops_metadata::{EntityDescriptor, SortOrder, SortSpec};

use super::query::{ListQuery, Page};
use super::r#trait::{Record, StorageAdapter, StorageError};
use super::scope::{RowFilter, RowFilterBuilder};

#[derive(Debug, Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, Record>,
}

/// `child table -> [(column, parent table, parent column)]`
type References = HashMap<String, BTreeSet<(String, String, String)>>;

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    references: References,
}

/// In-memory storage adapter.
///
/// Intended for tests/dev. Assigns auto-increment ids, enforces unique and
/// foreign-key constraints (deletes are restricted while referenced) and
/// applies RLS scopes as row filters.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: RwLock<State>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored in `table`.
    pub fn count(&self, table: &str) -> usize {
        self.state
            .read()
            .map(|s| s.tables.get(table).map_or(0, |t| t.rows.len()))
            .unwrap_or(0)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StorageError> {
        self.state
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StorageError> {
        self.state
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))
    }
}

fn scope_filter(entity: &EntityDescriptor, rls: &RlsContext) -> RowFilter {
    rls.filter(&RowFilterBuilder::new(&entity.primary_key))
}

fn register_references(state: &mut State, entity: &EntityDescriptor) {
    let refs = state.references.entry(entity.table_name.clone()).or_default();
    for (column, fk) in entity.foreign_keys() {
        refs.insert((column.to_string(), fk.table.clone(), fk.column.clone()));
    }
}

fn check_foreign_keys(state: &State, entity: &EntityDescriptor, data: &Record) -> Result<(), StorageError> {
    for (column, fk) in entity.foreign_keys() {
        let Some(value) = data.get(column).filter(|v| !v.is_null()) else {
            continue;
        };
        let exists = state
            .tables
            .get(&fk.table)
            .is_some_and(|t| t.rows.values().any(|row| row.get(&fk.column) == Some(value)));
        if !exists {
            return Err(StorageError::ForeignKeyViolation {
                table: entity.table_name.clone(),
                field: column.to_string(),
            });
        }
    }
    Ok(())
}

fn check_unique(
    table: Option<&Table>,
    entity: &EntityDescriptor,
    data: &Record,
    except: Option<i64>,
) -> Result<(), StorageError> {
    let Some(table) = table else {
        return Ok(());
    };
    for field in entity.unique_fields() {
        let Some(value) = data.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let taken = table
            .rows
            .iter()
            .any(|(id, row)| Some(*id) != except && row.get(field) == Some(value));
        if taken {
            return Err(StorageError::UniqueViolation {
                table: entity.table_name.clone(),
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

/// Restrict deletes of rows that other tables still reference.
fn check_not_referenced(state: &State, entity: &EntityDescriptor, row: &Record) -> Result<(), StorageError> {
    for (child, refs) in &state.references {
        for (column, parent, parent_column) in refs {
            if parent != &entity.table_name {
                continue;
            }
            let Some(key) = row.get(parent_column) else {
                continue;
            };
            let referenced = state
                .tables
                .get(child)
                .is_some_and(|t| t.rows.values().any(|r| r.get(column) == Some(key)));
            if referenced {
                return Err(StorageError::ForeignKeyViolation {
                    table: child.clone(),
                    field: column.clone(),
                });
            }
        }
    }
    Ok(())
}

fn touch(entity: &EntityDescriptor, record: &mut Record, created: bool) {
    let now = JsonValue::String(Utc::now().to_rfc3339());
    if created && entity.fields.contains_key("created_at") {
        record.insert("created_at".to_string(), now.clone());
    }
    if entity.fields.contains_key("updated_at") {
        record.insert("updated_at".to_string(), now);
    }
}

fn matches_search(entity: &EntityDescriptor, row: &Record, term: &str) -> bool {
    let term = term.to_lowercase();
    entity.searchable_fields.iter().any(|field| {
        row.get(field)
            .and_then(JsonValue::as_str)
            .is_some_and(|s| s.to_lowercase().contains(&term))
    })
}

fn compare_values(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (None | Some(JsonValue::Null), None | Some(JsonValue::Null)) => Ordering::Equal,
        (None | Some(JsonValue::Null), _) => Ordering::Less,
        (_, None | Some(JsonValue::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait::async_trait]
impl StorageAdapter for InMemoryStorage {
    async fn find_all(
        &self,
        entity: &EntityDescriptor,
        query: &ListQuery,
        rls: &RlsContext,
    ) -> Result<Page, StorageError> {
        let filter = scope_filter(entity, rls);
        let state = self.read()?;
        let Some(table) = state.tables.get(&entity.table_name) else {
            return Ok(Page::empty(query.pagination));
        };

        let mut rows: Vec<&Record> = table
            .rows
            .values()
            .filter(|row| filter.matches(row))
            .filter(|row| query.filters.iter().all(|(field, value)| row.get(field) == Some(value)))
            .filter(|row| {
                query
                    .search
                    .as_deref()
                    .is_none_or(|term| matches_search(entity, row, term))
            })
            .collect();

        let sort = query.sort.clone().or_else(|| entity.default_sort.clone()).unwrap_or(SortSpec {
            field: entity.primary_key.clone(),
            order: SortOrder::Asc,
        });
        rows.sort_by(|a, b| {
            let ord = compare_values(a.get(&sort.field), b.get(&sort.field));
            match sort.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = rows.len() as u64;
        let offset = query.pagination.offset as usize;
        let limit = query.pagination.limit as usize;
        let records: Vec<Record> = rows.into_iter().skip(offset).take(limit).cloned().collect();
        let has_more = (offset + records.len()) < total as usize;

        Ok(Page {
            records,
            total,
            pagination: query.pagination,
            has_more,
        })
    }

    async fn find_by_id(
        &self,
        entity: &EntityDescriptor,
        id: RecordId,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError> {
        let filter = scope_filter(entity, rls);
        let state = self.read()?;
        Ok(state
            .tables
            .get(&entity.table_name)
            .and_then(|t| t.rows.get(&id.get()))
            .filter(|row| filter.matches(row))
            .cloned())
    }

    async fn find_by_field(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        value: &JsonValue,
        rls: &RlsContext,
    ) -> Result<Vec<Record>, StorageError> {
        let filter = scope_filter(entity, rls);
        let state = self.read()?;
        Ok(state
            .tables
            .get(&entity.table_name)
            .map(|t| {
                t.rows
                    .values()
                    .filter(|row| row.get(field) == Some(value) && filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(
        &self,
        entity: &EntityDescriptor,
        mut data: Record,
        _rls: &RlsContext,
    ) -> Result<Record, StorageError> {
        let mut state = self.write()?;
        register_references(&mut state, entity);
        check_foreign_keys(&state, entity, &data)?;
        check_unique(state.tables.get(&entity.table_name), entity, &data, None)?;

        let table = state.tables.entry(entity.table_name.clone()).or_default();
        table.last_id += 1;
        let id = table.last_id;

        data.insert(entity.primary_key.clone(), JsonValue::from(id));
        touch(entity, &mut data, true);
        table.rows.insert(id, data.clone());

        tracing::trace!(table = %entity.table_name, id, "row inserted");
        Ok(data)
    }

    async fn update(
        &self,
        entity: &EntityDescriptor,
        id: RecordId,
        data: Record,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError> {
        let filter = scope_filter(entity, rls);
        let mut state = self.write()?;
        register_references(&mut state, entity);

        let Some(current) = state
            .tables
            .get(&entity.table_name)
            .and_then(|t| t.rows.get(&id.get()))
            .filter(|row| filter.matches(row))
        else {
            return Ok(None);
        };

        let mut after = current.clone();
        after.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        if !filter.matches(&after) {
            return Err(StorageError::OutOfScope {
                table: entity.table_name.clone(),
            });
        }

        check_foreign_keys(&state, entity, &data)?;
        check_unique(state.tables.get(&entity.table_name), entity, &data, Some(id.get()))?;

        let Some(row) = state
            .tables
            .get_mut(&entity.table_name)
            .and_then(|t| t.rows.get_mut(&id.get()))
        else {
            return Ok(None);
        };
        for (field, value) in data {
            if field != entity.primary_key {
                row.insert(field, value);
            }
        }
        touch(entity, row, false);
        Ok(Some(row.clone()))
    }

    async fn delete(
        &self,
        entity: &EntityDescriptor,
        id: RecordId,
        rls: &RlsContext,
    ) -> Result<Option<Record>, StorageError> {
        let filter = scope_filter(entity, rls);
        let mut state = self.write()?;
        register_references(&mut state, entity);

        let Some(row) = state
            .tables
            .get(&entity.table_name)
            .and_then(|t| t.rows.get(&id.get()))
            .filter(|row| filter.matches(row))
            .cloned()
        else {
            return Ok(None);
        };

        check_not_referenced(&state, entity, &row)?;

        if let Some(table) = state.tables.get_mut(&entity.table_name) {
            table.rows.remove(&id.get());
        }
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_auth::RlsScope;
    use fieldops_core::UserId;
    use fieldops_metadata::EntityRegistry;
    use serde_json::json;

    fn record(value: JsonValue) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    fn system() -> RlsContext {
        RlsContext::system(UserId::new(1))
    }

    #[tokio::test]
    async fn create_assigns_ids_and_enforces_unique_fields() {
        let registry = EntityRegistry::builtin().unwrap();
        let customers = registry.get("customer").unwrap();
        let storage = InMemoryStorage::new();

        let a = storage
            .create(customers, record(json!({ "email": "a@example.com" })), &system())
            .await
            .unwrap();
        assert_eq!(a["id"], json!(1));
        assert!(a.contains_key("created_at"));

        let err = storage
            .create(customers, record(json!({ "email": "a@example.com" })), &system())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::UniqueViolation {
                table: "customers".to_string(),
                field: "email".to_string()
            }
        );
    }

    #[tokio::test]
    async fn foreign_keys_are_checked_and_deletes_restricted() {
        let registry = EntityRegistry::builtin().unwrap();
        let customers = registry.get("customer").unwrap();
        let work_orders = registry.get("work_order").unwrap();
        let storage = InMemoryStorage::new();

        let err = storage
            .create(work_orders, record(json!({ "title": "x", "customer_id": 7 })), &system())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));

        storage
            .create(customers, record(json!({ "email": "c@example.com" })), &system())
            .await
            .unwrap();
        storage
            .create(work_orders, record(json!({ "title": "x", "customer_id": 1 })), &system())
            .await
            .unwrap();

        let err = storage.delete(customers, RecordId::new(1), &system()).await.unwrap_err();
        assert!(matches!(err, StorageError::ForeignKeyViolation { ref field, .. } if field == "customer_id"));
        assert_eq!(storage.count("customers"), 1);
    }

    #[tokio::test]
    async fn scope_hides_rows_outside_it() {
        let registry = EntityRegistry::builtin().unwrap();
        let customers = registry.get("customer").unwrap();
        let storage = InMemoryStorage::new();
        for email in ["a@example.com", "b@example.com"] {
            storage
                .create(customers, record(json!({ "email": email })), &system())
                .await
                .unwrap();
        }

        let own = RlsContext::new(RlsScope::OwnProfileOnly, UserId::new(9), Some(RecordId::new(2)));
        let page = storage.find_all(customers, &ListQuery::default(), &own).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0]["email"], json!("b@example.com"));

        assert!(storage.find_by_id(customers, RecordId::new(1), &own).await.unwrap().is_none());
        assert!(storage
            .update(customers, RecordId::new(1), record(json!({ "phone": "1" })), &own)
            .await
            .unwrap()
            .is_none());

        let deny = RlsContext::new(RlsScope::DenyAll, UserId::new(9), None);
        assert!(storage.delete(customers, RecordId::new(2), &deny).await.unwrap().is_none());
        assert_eq!(storage.count("customers"), 2);
    }

    #[tokio::test]
    async fn update_cannot_move_a_row_out_of_scope() {
        let registry = EntityRegistry::builtin().unwrap();
        let customers = registry.get("customer").unwrap();
        let work_orders = registry.get("work_order").unwrap();
        let storage = InMemoryStorage::new();
        for email in ["a@example.com", "b@example.com"] {
            storage
                .create(customers, record(json!({ "email": email })), &system())
                .await
                .unwrap();
        }
        storage
            .create(work_orders, record(json!({ "title": "Fix", "customer_id": 1 })), &system())
            .await
            .unwrap();

        let own = RlsContext::new(RlsScope::OwnWorkOrdersOnly, UserId::new(9), Some(RecordId::new(1)));
        let err = storage
            .update(work_orders, RecordId::new(1), record(json!({ "customer_id": 2 })), &own)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::OutOfScope {
                table: "work_orders".to_string()
            }
        );

        let row = storage.find_by_id(work_orders, RecordId::new(1), &own).await.unwrap().unwrap();
        assert_eq!(row["customer_id"], json!(1));

        let renamed = storage
            .update(work_orders, RecordId::new(1), record(json!({ "title": "Fix sink" })), &own)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed["title"], json!("Fix sink"));
    }

    #[tokio::test]
    async fn list_searches_filters_sorts_and_pages() {
        let registry = EntityRegistry::builtin().unwrap();
        let customers = registry.get("customer").unwrap();
        let storage = InMemoryStorage::new();
        for (email, last, status) in [
            ("z@example.com", "Zed", "active"),
            ("y@example.com", "Young", "active"),
            ("x@example.com", "Xu", "pending"),
        ] {
            storage
                .create(
                    customers,
                    record(json!({ "email": email, "last_name": last, "status": status })),
                    &system(),
                )
                .await
                .unwrap();
        }

        let page = storage
            .find_all(customers, &ListQuery::default().filter("status", "active"), &system())
            .await
            .unwrap();
        let names: Vec<&JsonValue> = page.records.iter().map(|r| &r["last_name"]).collect();
        assert_eq!(names, [&json!("Young"), &json!("Zed")]);

        let page = storage
            .find_all(customers, &ListQuery::default().search("XU"), &system())
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let page = storage
            .find_all(customers, &ListQuery::default().page(2, 0), &system())
            .await
            .unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(page.has_more);
    }
}
