//! The data provider contract.
//!
//! A provider answers list and by-id queries for named resources. The wire
//! format behind it (REST, GraphQL, in-memory) is the implementor's concern.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use adminkit_model::{FilterValues, Identifier, Pagination, Record, SortPayload};

use crate::error::Result;

// =============================================================================
// REQUEST / RESPONSE TYPES
// =============================================================================

/// Parameters of a list query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetListParams {
    /// Page to fetch.
    pub pagination: Pagination,
    /// Sort field and order.
    pub sort: SortPayload,
    /// Filter values, already stripped of empty leaves.
    pub filter: FilterValues,
    /// Opaque provider-specific metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Cursor-style page availability, for providers that do not count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Whether a page follows the returned one.
    pub has_next_page: Option<bool>,
    /// Whether a page precedes the returned one.
    pub has_previous_page: Option<bool>,
}

/// Result of a list query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetListResult {
    /// Records on the requested page.
    pub data: Vec<Record>,
    /// Total number of matching records, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Page availability, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info: Option<PageInfo>,
}

/// Parameters of a by-id query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetManyParams {
    /// Ids to fetch.
    pub ids: Vec<Identifier>,
    /// Opaque provider-specific metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl GetManyParams {
    /// Params for `ids` without metadata.
    pub fn new(ids: Vec<Identifier>) -> Self {
        Self { ids, meta: None }
    }
}

/// Result of a by-id query. Missing ids are simply absent from `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetManyResult {
    /// Records found.
    pub data: Vec<Record>,
}

// =============================================================================
// PROVIDER TRAIT
// =============================================================================

/// Backend access used by the choices layer.
#[async_trait]
pub trait DataProvider: Send + Sync + Debug {
    /// Fetch one page of `resource`.
    async fn get_list(&self, resource: &str, params: GetListParams) -> Result<GetListResult>;

    /// Fetch records of `resource` by id.
    async fn get_many(&self, resource: &str, params: GetManyParams) -> Result<GetManyResult>;
}
