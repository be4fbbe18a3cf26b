//! Scope filters for the storage adapters.
//!
//! [`RowFilter`] is evaluated in memory; [`SqlPredicate`] renders the same
//! scopes as a parameterized `WHERE` fragment for SQL backends.

use serde_json::Value as JsonValue;

use fieldops_auth::{RlsContext, ScopeFilterBuilder};

use super::r#trait::Record;

/// Column linking a row to the customer profile that owns it.
pub const CUSTOMER_COLUMN: &str = "customer_id";

/// Column linking a work order to the technician profile it is assigned to.
pub const TECHNICIAN_COLUMN: &str = "assigned_technician_id";

/// In-memory row predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    All,
    Nothing,
    /// Row matches when any `(column, id)` pair holds.
    AnyOf(Vec<(String, i64)>),
}

impl RowFilter {
    fn column(column: &str, id: i64) -> Self {
        RowFilter::AnyOf(vec![(column.to_string(), id)])
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Nothing => false,
            RowFilter::AnyOf(pairs) => pairs
                .iter()
                .any(|(column, id)| record.get(column).and_then(JsonValue::as_i64) == Some(*id)),
        }
    }
}

/// Builds [`RowFilter`]s for one table.
#[derive(Debug, Clone, Copy)]
pub struct RowFilterBuilder<'a> {
    pub primary_key: &'a str,
}

impl<'a> RowFilterBuilder<'a> {
    pub fn new(primary_key: &'a str) -> Self {
        Self { primary_key }
    }

    fn profile(&self, ctx: &RlsContext, columns: &[&str]) -> RowFilter {
        match ctx.profile_id {
            Some(profile) => RowFilter::AnyOf(
                columns
                    .iter()
                    .map(|column| (column.to_string(), profile.get()))
                    .collect(),
            ),
            None => RowFilter::Nothing,
        }
    }
}

impl ScopeFilterBuilder for RowFilterBuilder<'_> {
    type Filter = RowFilter;

    fn all_records(&self, _: &RlsContext) -> RowFilter {
        RowFilter::All
    }

    fn deny_all(&self, _: &RlsContext) -> RowFilter {
        RowFilter::Nothing
    }

    fn own_record_only(&self, ctx: &RlsContext) -> RowFilter {
        RowFilter::column(self.primary_key, ctx.actor_id.get())
    }

    fn own_profile_only(&self, ctx: &RlsContext) -> RowFilter {
        self.profile(ctx, &[self.primary_key])
    }

    fn own_or_assigned(&self, ctx: &RlsContext) -> RowFilter {
        self.profile(ctx, &[CUSTOMER_COLUMN, TECHNICIAN_COLUMN])
    }

    fn own_work_orders_only(&self, ctx: &RlsContext) -> RowFilter {
        self.profile(ctx, &[CUSTOMER_COLUMN])
    }

    fn assigned_work_orders_only(&self, ctx: &RlsContext) -> RowFilter {
        self.profile(ctx, &[TECHNICIAN_COLUMN])
    }

    fn own_billing_only(&self, ctx: &RlsContext) -> RowFilter {
        self.profile(ctx, &[CUSTOMER_COLUMN])
    }
}

/// Parameterized SQL predicate (`$n` placeholders, Postgres style).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPredicate {
    pub clause: String,
    pub params: Vec<i64>,
}

impl SqlPredicate {
    fn constant(clause: &str) -> Self {
        Self {
            clause: clause.to_string(),
            params: Vec::new(),
        }
    }
}

/// Builds [`SqlPredicate`]s with placeholders numbered from `first_param`.
#[derive(Debug, Clone, Copy)]
pub struct SqlScopeBuilder<'a> {
    pub primary_key: &'a str,
    pub first_param: usize,
}

impl<'a> SqlScopeBuilder<'a> {
    pub fn new(primary_key: &'a str, first_param: usize) -> Self {
        Self {
            primary_key,
            first_param,
        }
    }

    fn any_of(&self, columns: &[&str], id: i64) -> SqlPredicate {
        let parts: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("\"{column}\" = ${}", self.first_param + i))
            .collect();
        let clause = if parts.len() == 1 {
            parts.concat()
        } else {
            format!("({})", parts.join(" OR "))
        };
        SqlPredicate {
            clause,
            params: vec![id; columns.len()],
        }
    }

    fn profile(&self, ctx: &RlsContext, columns: &[&str]) -> SqlPredicate {
        match ctx.profile_id {
            Some(profile) => self.any_of(columns, profile.get()),
            None => SqlPredicate::constant("FALSE"),
        }
    }
}

impl ScopeFilterBuilder for SqlScopeBuilder<'_> {
    type Filter = SqlPredicate;

    fn all_records(&self, _: &RlsContext) -> SqlPredicate {
        SqlPredicate::constant("TRUE")
    }

    fn deny_all(&self, _: &RlsContext) -> SqlPredicate {
        SqlPredicate::constant("FALSE")
    }

    fn own_record_only(&self, ctx: &RlsContext) -> SqlPredicate {
        self.any_of(&[self.primary_key], ctx.actor_id.get())
    }

    fn own_profile_only(&self, ctx: &RlsContext) -> SqlPredicate {
        self.profile(ctx, &[self.primary_key])
    }

    fn own_or_assigned(&self, ctx: &RlsContext) -> SqlPredicate {
        self.profile(ctx, &[CUSTOMER_COLUMN, TECHNICIAN_COLUMN])
    }

    fn own_work_orders_only(&self, ctx: &RlsContext) -> SqlPredicate {
        self.profile(ctx, &[CUSTOMER_COLUMN])
    }

    fn assigned_work_orders_only(&self, ctx: &RlsContext) -> SqlPredicate {
        self.profile(ctx, &[TECHNICIAN_COLUMN])
    }

    fn own_billing_only(&self, ctx: &RlsContext) -> SqlPredicate {
        self.profile(ctx, &[CUSTOMER_COLUMN])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_auth::RlsScope;
    use fieldops_core::{RecordId, UserId};
    use serde_json::json;

    fn record(value: JsonValue) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn profile_scopes_without_a_profile_match_nothing() {
        let ctx = RlsContext::new(RlsScope::OwnBillingOnly, UserId::new(4), None);
        assert_eq!(ctx.filter(&RowFilterBuilder::new("id")), RowFilter::Nothing);
        assert_eq!(ctx.filter(&SqlScopeBuilder::new("id", 1)).clause, "FALSE");
    }

    #[test]
    fn own_or_assigned_matches_either_column() {
        let ctx = RlsContext::new(RlsScope::OwnOrAssigned, UserId::new(4), Some(RecordId::new(9)));
        let filter = ctx.filter(&RowFilterBuilder::new("id"));
        assert!(filter.matches(&record(json!({ "customer_id": 9, "assigned_technician_id": 2 }))));
        assert!(filter.matches(&record(json!({ "customer_id": 1, "assigned_technician_id": 9 }))));
        assert!(!filter.matches(&record(json!({ "customer_id": 1 }))));

        let sql = ctx.filter(&SqlScopeBuilder::new("id", 3));
        assert_eq!(sql.clause, "(\"customer_id\" = $3 OR \"assigned_technician_id\" = $4)");
        assert_eq!(sql.params, [9, 9]);
    }

    #[test]
    fn own_record_uses_the_actor_id() {
        let ctx = RlsContext::new(RlsScope::OwnRecordOnly, UserId::new(12), Some(RecordId::new(3)));
        let filter = ctx.filter(&RowFilterBuilder::new("id"));
        assert!(filter.matches(&record(json!({ "id": 12 }))));
        assert!(!filter.matches(&record(json!({ "id": 3 }))));
    }
}
