//! In-memory data: list querying over a record slice, and a provider backed
//! by it.
//!
//! `MemoryProvider` records every call it receives, so tests can assert how
//! many backend round-trips a component caused and with which arguments.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use adminkit_common::flatten_object;
use adminkit_model::{FilterValues, Record, SortOrder, SortPayload};

use crate::error::{DataError, Result};
use crate::provider::{
    DataProvider, GetListParams, GetListResult, GetManyParams, GetManyResult,
};

// =============================================================================
// LIST QUERYING
// =============================================================================

/// Filter, sort and paginate `records` the way a simple backend would.
///
/// `total` is the number of records matching the filter, before pagination.
pub fn apply_list_query(records: &[Record], params: &GetListParams) -> GetListResult {
    let mut matching = filter_records(records, &params.filter);
    sort_records(&mut matching, &params.sort);
    let total = matching.len() as u64;
    let offset = params.pagination.offset();
    let data = matching
        .into_iter()
        .skip(offset)
        .take(params.pagination.per_page as usize)
        .collect();
    GetListResult {
        data,
        total: Some(total),
        page_info: None,
    }
}

/// Records matching every entry of the (flattened) filter.
///
/// - array record values match when they contain the filter value (or share
///   an element with an array filter value);
/// - array filter values match when they contain the record value;
/// - `q` matches when any top-level string field contains it, ignoring case;
/// - anything else compares with loose equality (`"1"` equals `1`).
pub fn filter_records(records: &[Record], filter: &FilterValues) -> Vec<Record> {
    let flat = flatten_object(filter);
    records
        .iter()
        .filter(|record| {
            flat.iter()
                .all(|(name, expected)| matches_filter(record, name, expected))
        })
        .cloned()
        .collect()
}

fn matches_filter(record: &Record, name: &str, expected: &Value) -> bool {
    let actual = record.get(name);
    match (actual, expected) {
        (Some(Value::Array(items)), Value::Array(wanted)) => {
            items.iter().any(|item| wanted.contains(item))
        }
        (Some(Value::Array(items)), _) => items.contains(expected),
        (_, Value::Array(wanted)) => actual.is_some_and(|value| wanted.contains(value)),
        _ if name == "q" => full_text_match(record, expected),
        (actual, expected) => loose_eq(actual, expected),
    }
}

fn full_text_match(record: &Record, needle: &Value) -> bool {
    let needle = match needle {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    };
    record.fields().values().any(|value| match value {
        Value::String(s) => s.to_lowercase().contains(&needle),
        _ => false,
    })
}

fn loose_eq(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return expected.is_null();
    };
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .zip(n.as_f64())
            .is_some_and(|(a, b)| a == b),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s == if *b { "true" } else { "false" }
        }
        _ => false,
    }
}

/// Stable sort on a dotted field. Values of different kinds compare equal.
pub fn sort_records(records: &mut [Record], sort: &SortPayload) {
    if sort.field.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        let ordering = compare_values(a.get(&sort.field), b.get(&sort.field));
        match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b))
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

// =============================================================================
// MEMORY PROVIDER
// =============================================================================

/// A call received by [`MemoryProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    /// `get_list(resource, params)`.
    GetList {
        /// Resource queried.
        resource: String,
        /// Parameters received.
        params: GetListParams,
    },
    /// `get_many(resource, params)`.
    GetMany {
        /// Resource queried.
        resource: String,
        /// Parameters received.
        params: GetManyParams,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    resources: HashMap<String, Vec<Record>>,
    failures: HashMap<String, DataError>,
    calls: Vec<ProviderCall>,
}

/// Data provider serving records from memory.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: serve `records` for `resource`.
    #[must_use]
    pub fn with_records(self, resource: &str, records: Vec<Record>) -> Self {
        self.insert(resource, records);
        self
    }

    /// Builder-style: delay every response by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the records of `resource`.
    pub fn insert(&self, resource: &str, records: Vec<Record>) {
        self.lock().resources.insert(resource.to_string(), records);
    }

    /// Make every call on `resource` fail with `error`, or succeed again with `None`.
    pub fn set_failure(&self, resource: &str, error: Option<DataError>) {
        let mut state = self.lock();
        match error {
            Some(error) => {
                state.failures.insert(resource.to_string(), error);
            }
            None => {
                state.failures.remove(resource);
            }
        }
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    /// `get_list` parameters received for `resource`, in order.
    pub fn get_list_calls(&self, resource: &str) -> Vec<GetListParams> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProviderCall::GetList { resource: r, params } if r == resource => {
                    Some(params.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// `get_many` parameters received for `resource`, in order.
    pub fn get_many_calls(&self, resource: &str) -> Vec<GetManyParams> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProviderCall::GetMany { resource: r, params } if r == resource => {
                    Some(params.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl DataProvider for MemoryProvider {
    async fn get_list(&self, resource: &str, params: GetListParams) -> Result<GetListResult> {
        let outcome = {
            let mut state = self.lock();
            state.calls.push(ProviderCall::GetList {
                resource: resource.to_string(),
                params: params.clone(),
            });
            match state.failures.get(resource) {
                Some(error) => Err(error.clone()),
                None => {
                    let records = state.resources.get(resource).map_or(&[][..], Vec::as_slice);
                    Ok(apply_list_query(records, &params))
                }
            }
        };
        self.wait().await;
        outcome
    }

    async fn get_many(&self, resource: &str, params: GetManyParams) -> Result<GetManyResult> {
        let outcome = {
            let mut state = self.lock();
            state.calls.push(ProviderCall::GetMany {
                resource: resource.to_string(),
                params: params.clone(),
            });
            match state.failures.get(resource) {
                Some(error) => Err(error.clone()),
                None => {
                    let records = state.resources.get(resource).map_or(&[][..], Vec::as_slice);
                    let mut seen = HashSet::new();
                    let data = params
                        .ids
                        .iter()
                        .filter(|id| seen.insert(*id))
                        .filter_map(|id| records.iter().find(|record| record.id() == id))
                        .cloned()
                        .collect();
                    Ok(GetManyResult { data })
                }
            }
        };
        self.wait().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adminkit_model::Pagination;
    use serde_json::json;

    fn books() -> Vec<Record> {
        vec![
            Record::new(1).with("title", "War and Peace").with("year", 1869).with("tags", json!(["classic", "long"])),
            Record::new(2).with("title", "Dune").with("year", 1965).with("author", json!({"name": "Herbert"})),
            Record::new(3).with("title", "Neuromancer").with("year", 1984).with("tags", json!(["cyberpunk"])),
        ]
    }

    fn filter(value: Value) -> FilterValues {
        match value {
            Value::Object(map) => map,
            _ => FilterValues::new(),
        }
    }

    fn ids(records: &[Record]) -> Vec<String> {
        records.iter().map(|r| r.id().to_string()).collect()
    }

    #[test]
    fn loose_equality_and_full_text() {
        assert_eq!(ids(&filter_records(&books(), &filter(json!({"year": "1965"})))), ["2"]);
        assert_eq!(ids(&filter_records(&books(), &filter(json!({"q": "MANCER"})))), ["3"]);
        assert_eq!(
            ids(&filter_records(&books(), &filter(json!({"author": {"name": "Herbert"}})))),
            ["2"]
        );
    }

    #[test]
    fn array_containment() {
        assert_eq!(ids(&filter_records(&books(), &filter(json!({"tags": "classic"})))), ["1"]);
        assert_eq!(
            ids(&filter_records(&books(), &filter(json!({"tags": ["long", "cyberpunk"]})))),
            ["1", "3"]
        );
        assert_eq!(ids(&filter_records(&books(), &filter(json!({"id": [1, 2]})))), ["1", "2"]);
    }

    #[test]
    fn sorts_and_paginates() {
        let params = GetListParams {
            pagination: Pagination::new(1, 2),
            sort: SortPayload::desc("year"),
            ..GetListParams::default()
        };
        let result = apply_list_query(&books(), &params);
        assert_eq!(ids(&result.data), ["3", "2"]);
        assert_eq!(result.total, Some(3));

        let second = GetListParams {
            pagination: Pagination::new(2, 2),
            ..params
        };
        assert_eq!(ids(&apply_list_query(&books(), &second).data), ["1"]);
    }

    #[tokio::test]
    async fn provider_logs_calls_and_injects_failures() {
        let provider = MemoryProvider::new().with_records("books", books());
        let many = provider
            .get_many("books", GetManyParams::new(vec![3.into(), 9.into(), 1.into()]))
            .await
            .expect("get_many");
        assert_eq!(ids(&many.data), ["3", "1"]);

        provider.set_failure("books", Some(DataError::backend("down")));
        let err = provider
            .get_list("books", GetListParams::default())
            .await
            .expect_err("injected failure");
        assert_eq!(err, DataError::backend("down"));
        assert_eq!(provider.calls().len(), 2);
        assert_eq!(provider.get_list_calls("books").len(), 1);
        assert_eq!(provider.get_many_calls("books")[0].ids.len(), 3);
    }
}
