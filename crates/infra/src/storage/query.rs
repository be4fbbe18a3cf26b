//! List query parameters and paginated results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use fieldops_metadata::SortSpec;

use super::r#trait::Record;

/// Pagination parameters for list queries.
///
/// Deserialized values go through [`Pagination::new`], so the limit is
/// always within `1..=MAX_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PaginationParams")]
pub struct Pagination {
    pub limit: u32,
    /// 0-based row offset.
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// Re-apply the limit bounds to a value built field by field.
    pub fn clamped(self) -> Self {
        Self::new(Some(self.limit), Some(self.offset))
    }
}

#[derive(Deserialize)]
struct PaginationParams {
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

impl From<PaginationParams> for Pagination {
    fn from(params: PaginationParams) -> Self {
        Self::new(params.limit, params.offset)
    }
}

/// Search, filter, sort and page a list read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Case-insensitive substring matched against the entity's searchable fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Exact-match filters; every one must hold.
    #[serde(default)]
    pub filters: BTreeMap<String, JsonValue>,
    /// Falls back to the entity's default sort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl ListQuery {
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(mut self, limit: u32, offset: u32) -> Self {
        self.pagination = Pagination::new(Some(limit), Some(offset));
        self
    }
}

/// One page of a list read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<Record>,
    /// Rows matching the query across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl Page {
    pub fn empty(pagination: Pagination) -> Self {
        Self {
            records: Vec::new(),
            total: 0,
            pagination,
            has_more: false,
        }
    }
}
