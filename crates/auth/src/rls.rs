//! Row-level security vocabulary.
//!
//! A scope is a closed set of symbols. It is not a query fragment: storage
//! adapters turn it into a filter through [`ScopeFilterBuilder`], which has one
//! method per scope so that every adapter handles every scope.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use fieldops_core::{RecordId, UserId};

/// Which records of a permitted resource an actor may see or touch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RlsScope {
    /// Every record.
    AllRecords,
    /// No record at all.
    DenyAll,
    /// The record whose primary key is the actor's user id.
    OwnRecordOnly,
    /// The record whose primary key is the actor's linked profile id.
    OwnProfileOnly,
    /// Records the actor's profile owns as customer or works as technician.
    OwnOrAssigned,
    /// Work orders placed by the actor's customer profile.
    OwnWorkOrdersOnly,
    /// Work orders assigned to the actor's technician profile.
    AssignedWorkOrdersOnly,
    /// Billing records (invoices, contracts) of the actor's customer profile.
    OwnBillingOnly,
}

impl RlsScope {
    pub const ALL: [RlsScope; 8] = [
        RlsScope::AllRecords,
        RlsScope::DenyAll,
        RlsScope::OwnRecordOnly,
        RlsScope::OwnProfileOnly,
        RlsScope::OwnOrAssigned,
        RlsScope::OwnWorkOrdersOnly,
        RlsScope::AssignedWorkOrdersOnly,
        RlsScope::OwnBillingOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RlsScope::AllRecords => "all_records",
            RlsScope::DenyAll => "deny_all",
            RlsScope::OwnRecordOnly => "own_record_only",
            RlsScope::OwnProfileOnly => "own_profile_only",
            RlsScope::OwnOrAssigned => "own_or_assigned",
            RlsScope::OwnWorkOrdersOnly => "own_work_orders_only",
            RlsScope::AssignedWorkOrdersOnly => "assigned_work_orders_only",
            RlsScope::OwnBillingOnly => "own_billing_only",
        }
    }

    /// Accepted tag strings, for diagnostics.
    pub fn vocabulary() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.as_str()).collect()
    }

    /// Translate the scope into an adapter filter.
    pub fn build_filter<B>(self, builder: &B, ctx: &RlsContext) -> B::Filter
    where
        B: ScopeFilterBuilder + ?Sized,
    {
        match self {
            RlsScope::AllRecords => builder.all_records(ctx),
            RlsScope::DenyAll => builder.deny_all(ctx),
            RlsScope::OwnRecordOnly => builder.own_record_only(ctx),
            RlsScope::OwnProfileOnly => builder.own_profile_only(ctx),
            RlsScope::OwnOrAssigned => builder.own_or_assigned(ctx),
            RlsScope::OwnWorkOrdersOnly => builder.own_work_orders_only(ctx),
            RlsScope::AssignedWorkOrdersOnly => builder.assigned_work_orders_only(ctx),
            RlsScope::OwnBillingOnly => builder.own_billing_only(ctx),
        }
    }
}

impl core::fmt::Display for RlsScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown row-level security scope '{0}'")]
pub struct UnknownScope(pub String);

impl FromStr for RlsScope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| UnknownScope(s.to_string()))
    }
}

/// Scope plus the actor identity a storage adapter needs to apply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RlsContext {
    pub scope: RlsScope,
    pub actor_id: UserId,
    pub profile_id: Option<RecordId>,
}

impl RlsContext {
    pub fn new(scope: RlsScope, actor_id: UserId, profile_id: Option<RecordId>) -> Self {
        Self {
            scope,
            actor_id,
            profile_id,
        }
    }

    /// Context for engine-internal lookups that must see every record.
    pub fn system(actor_id: UserId) -> Self {
        Self::new(RlsScope::AllRecords, actor_id, None)
    }

    pub fn filter<B>(&self, builder: &B) -> B::Filter
    where
        B: ScopeFilterBuilder + ?Sized,
    {
        self.scope.build_filter(builder, self)
    }
}

/// Storage-side translation of every scope into a filter predicate.
///
/// Adding a scope adds a method here, so every adapter stops compiling until
/// it handles the new scope.
pub trait ScopeFilterBuilder {
    type Filter;

    fn all_records(&self, ctx: &RlsContext) -> Self::Filter;
    fn deny_all(&self, ctx: &RlsContext) -> Self::Filter;
    fn own_record_only(&self, ctx: &RlsContext) -> Self::Filter;
    fn own_profile_only(&self, ctx: &RlsContext) -> Self::Filter;
    fn own_or_assigned(&self, ctx: &RlsContext) -> Self::Filter;
    fn own_work_orders_only(&self, ctx: &RlsContext) -> Self::Filter;
    fn assigned_work_orders_only(&self, ctx: &RlsContext) -> Self::Filter;
    fn own_billing_only(&self, ctx: &RlsContext) -> Self::Filter;
}
