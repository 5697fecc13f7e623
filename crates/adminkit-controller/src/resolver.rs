//! Choices resolution for reference inputs.
//!
//! A resolve pass runs two fetches side by side: the candidate page
//! (`get_list`) and the currently selected records (`get_many` through the
//! batched lookup layer). Selected records missing from the page are
//! prepended so the input can always display its value.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future;
use serde_json::{Value, json};

use adminkit_common::logging::redact_payload;
use adminkit_common::remove_empty;
use adminkit_data::{
    BatchedLookup, CacheKey, DataError, DataProvider, GetListParams, GetListResult, PageInfo,
    QueryCache,
};
use adminkit_model::{FilterValues, Identifier, Pagination, QueryState, Record, SortPayload};

// =============================================================================
// QUERY
// =============================================================================

/// Decides from the current filter whether candidates should be fetched.
pub type EnableGetChoices = Arc<dyn Fn(&FilterValues) -> bool + Send + Sync>;

/// What to resolve: the reference resource and its candidate query.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoicesQuery {
    /// Referenced resource.
    pub reference: String,
    /// Form field holding the selected id(s).
    pub source: String,
    /// Candidate page.
    pub pagination: Pagination,
    /// Candidate sort.
    pub sort: SortPayload,
    /// Candidate filter. Empty leaves are removed before fetching.
    pub filter: FilterValues,
    /// Opaque provider metadata passed to `get_list`.
    pub meta: Option<Value>,
    /// Master switch for the candidate fetch.
    pub enabled: bool,
}

impl ChoicesQuery {
    /// Query for `reference` with default paging and sort.
    pub fn new(reference: &str, source: &str) -> Self {
        Self {
            reference: reference.to_string(),
            source: source.to_string(),
            pagination: Pagination::default(),
            sort: SortPayload::default(),
            filter: FilterValues::new(),
            meta: None,
            enabled: true,
        }
    }

    /// Query using the page, sort and filter of `params`.
    pub fn from_params(reference: &str, source: &str, params: &QueryState) -> Self {
        Self {
            pagination: params.pagination(),
            sort: params.sort.clone(),
            filter: params.filter.clone(),
            ..Self::new(reference, source)
        }
    }

    /// Set the candidate page.
    #[must_use]
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// Set the candidate sort.
    #[must_use]
    pub fn with_sort(mut self, sort: SortPayload) -> Self {
        self.sort = sort;
        self
    }

    /// Set the candidate filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterValues) -> Self {
        self.filter = filter;
        self
    }

    /// Set provider metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Enable or disable the candidate fetch.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn list_params(&self) -> GetListParams {
        GetListParams {
            pagination: self.pagination,
            sort: self.sort.clone(),
            filter: remove_empty(&self.filter),
            meta: self.meta.clone(),
        }
    }
}

// =============================================================================
// RESULT
// =============================================================================

/// Outcome of a resolve pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedChoices {
    /// Selected records missing from the page, then the page.
    pub all_choices: Vec<Record>,
    /// The candidate page.
    pub available_choices: Vec<Record>,
    /// Records for the selected ids that the backend returned.
    pub selected_choices: Vec<Record>,
    /// Candidate total plus prepended records; `None` if the backend gave no total.
    pub total: Option<u64>,
    /// No data yet and a fetch is running.
    pub is_loading: bool,
    /// A fetch is running.
    pub is_fetching: bool,
    /// First fetch error; the candidate fetch wins over the selected fetch.
    pub error: Option<DataError>,
    /// Whether another candidate page follows, when known.
    pub has_next_page: Option<bool>,
    /// Whether a candidate page precedes, when known.
    pub has_previous_page: Option<bool>,
}

/// Prepend the selected records missing from `available`, once each.
///
/// `total` grows by the number of prepended records, or stays `None`.
pub fn merge_choices(
    available: &[Record],
    selected: &[Record],
    total: Option<u64>,
) -> (Vec<Record>, Option<u64>) {
    let mut known: HashSet<&Identifier> = available.iter().map(Record::id).collect();
    let missing: Vec<Record> = selected
        .iter()
        .filter(|record| known.insert(record.id()))
        .cloned()
        .collect();
    let added = missing.len() as u64;
    let mut all = missing;
    all.extend_from_slice(available);
    (all, total.map(|total| total + added))
}

/// Page availability from `page_info`, else from `total`, else unknown.
pub fn page_flags(
    page_info: Option<&PageInfo>,
    total: Option<u64>,
    pagination: Pagination,
) -> (Option<bool>, Option<bool>) {
    if let Some(info) = page_info {
        return (info.has_next_page, info.has_previous_page);
    }
    match total {
        Some(total) => (
            Some(u64::from(pagination.page) * u64::from(pagination.per_page) < total),
            Some(pagination.page > 1),
        ),
        None => (None, None),
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Caches shared by resolvers so identical requests hit the backend once.
#[derive(Debug, Clone, Default)]
pub struct ResolverCaches {
    /// Candidate pages.
    pub lists: QueryCache<GetListResult>,
    /// Selected record lookups.
    pub selections: QueryCache<Vec<Option<Record>>>,
}

impl ResolverCaches {
    /// Drop cached results of `reference`.
    pub fn invalidate(&self, reference: &str) {
        self.lists.invalidate_resource(reference);
        self.selections.invalidate_resource(reference);
    }
}

struct LastResolve {
    signature: String,
    ids: Vec<Identifier>,
    choices: ResolvedChoices,
}

/// Only the most recently started resolve may publish its result.
#[derive(Default)]
struct ResolverState {
    last: Option<LastResolve>,
    generation: u64,
    in_flight: Option<u64>,
}

/// Clears the running flag when a resolve ends, completed or dropped.
struct FetchGuard<'a> {
    resolver: &'a ChoicesResolver,
    generation: u64,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.resolver.lock();
        if state.in_flight == Some(self.generation) {
            state.in_flight = None;
        }
    }
}

/// Resolves candidate and selected records for one reference input.
pub struct ChoicesResolver {
    lookup: BatchedLookup,
    caches: ResolverCaches,
    enable_get_choices: Option<EnableGetChoices>,
    state: Mutex<ResolverState>,
}

impl fmt::Debug for ChoicesResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChoicesResolver")
            .field("lookup", &self.lookup)
            .field("caches", &self.caches)
            .field("enable_get_choices", &self.enable_get_choices.is_some())
            .finish()
    }
}

impl ChoicesResolver {
    /// Create a resolver with its own caches.
    pub fn new(lookup: BatchedLookup) -> Self {
        Self {
            lookup,
            caches: ResolverCaches::default(),
            enable_get_choices: None,
            state: Mutex::new(ResolverState::default()),
        }
    }

    /// Share caches with other resolvers.
    #[must_use]
    pub fn with_caches(mut self, caches: ResolverCaches) -> Self {
        self.caches = caches;
        self
    }

    /// Only fetch candidates when `predicate` accepts the current filter.
    #[must_use]
    pub fn with_enable_get_choices(mut self, predicate: EnableGetChoices) -> Self {
        self.enable_get_choices = Some(predicate);
        self
    }

    fn provider(&self) -> &Arc<dyn DataProvider> {
        self.lookup.provider()
    }

    fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve choices for `query` with the field's `current_value`.
    ///
    /// An unchanged request returns the previous result without fetching.
    /// Fetch failures are reported in [`ResolvedChoices::error`].
    pub async fn resolve(&self, query: &ChoicesQuery, current_value: &Value) -> ResolvedChoices {
        let ids = Identifier::list_from_value(current_value);
        let enabled = query.enabled
            && self
                .enable_get_choices
                .as_ref()
                .is_none_or(|predicate| predicate(&query.filter));
        let params = query.list_params();
        let signature = json!({
            "reference": query.reference,
            "params": params,
            "enabled": enabled,
            "ids": ids,
        })
        .to_string();

        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            let memoised = state
                .last
                .as_ref()
                .filter(|last| last.signature == signature)
                .map(|last| last.choices.clone());
            if let Some(choices) = memoised {
                state.in_flight = None;
                return choices;
            }
            state.in_flight = Some(state.generation);
            state.generation
        };
        let _fetching = FetchGuard {
            resolver: self,
            generation,
        };

        let list = async {
            if !enabled {
                return Ok(None);
            }
            let key = CacheKey::new(&query.reference, "getList", &params);
            let fetch_params = params.clone();
            self.caches
                .lists
                .get_or_fetch(key, || self.provider().get_list(&query.reference, fetch_params))
                .await
                .map(Some)
        };
        let selected = async {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let key = CacheKey::new(&query.reference, "getMany", &ids);
            self.caches
                .selections
                .get_or_fetch(key, || self.lookup.lookup_many(&query.reference, &ids))
                .await
        };
        let (list, selected) = future::join(list, selected).await;

        let resolved = assemble(query.pagination, list, selected);
        tracing::debug!(
            reference = %query.reference,
            source = %query.source,
            enabled,
            available = resolved.available_choices.len(),
            all = resolved.all_choices.len(),
            error = resolved.error.is_some(),
            "Resolved choices"
        );
        tracing::trace!(
            reference = %query.reference,
            selected = %redact_payload(&resolved.selected_choices),
            "Selected records"
        );

        let mut state = self.lock();
        if state.generation == generation {
            state.last = Some(LastResolve {
                signature,
                ids,
                choices: resolved.clone(),
            });
        } else {
            tracing::debug!(reference = %query.reference, "Dropping superseded resolve");
        }
        resolved
    }

    /// Result of the latest completed resolve, with loading flags
    /// reflecting a running one.
    pub fn snapshot(&self) -> ResolvedChoices {
        let state = self.lock();
        let mut resolved = state
            .last
            .as_ref()
            .map(|last| last.choices.clone())
            .unwrap_or_default();
        if state.in_flight.is_some() {
            resolved.is_fetching = true;
            resolved.is_loading = state.last.is_none();
        }
        resolved
    }

    /// Selected ids the snapshot was resolved for; `None` before the first
    /// resolve.
    pub fn resolved_ids(&self) -> Option<Vec<Identifier>> {
        self.lock().last.as_ref().map(|last| last.ids.clone())
    }

    /// Forget the previous result and cached responses for `reference`, so
    /// the next resolve hits the backend again.
    pub fn invalidate(&self, reference: &str) {
        self.lock().last = None;
        self.caches.invalidate(reference);
    }
}

fn assemble(
    pagination: Pagination,
    list: Result<Option<GetListResult>, DataError>,
    selected: Result<Vec<Option<Record>>, DataError>,
) -> ResolvedChoices {
    let (list, list_error) = match list {
        Ok(list) => (list.unwrap_or_default(), None),
        Err(error) => (GetListResult::default(), Some(error)),
    };
    let (selected, selected_error) = match selected {
        Ok(records) => (records.into_iter().flatten().collect::<Vec<_>>(), None),
        Err(error) => (Vec::new(), Some(error)),
    };

    let (has_next_page, has_previous_page) =
        page_flags(list.page_info.as_ref(), list.total, pagination);
    let (all_choices, total) = merge_choices(&list.data, &selected, list.total);
    ResolvedChoices {
        all_choices,
        available_choices: list.data,
        selected_choices: selected,
        total,
        is_loading: false,
        is_fetching: false,
        error: list_error.or(selected_error),
        has_next_page,
        has_previous_page,
    }
}
