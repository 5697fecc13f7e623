//! Reference input controller.
//!
//! Ties a [`ParamsController`] for the candidate query to a
//! [`ChoicesResolver`] and exposes the result as a [`ChoicesContextValue`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use adminkit_data::{BatchedLookup, Scheduler};
use adminkit_model::{
    DisplayedFilters, FilterValues, Identifier, QueryState, ReferenceDefaults, SortPayload,
};

use crate::context::{ChoicesActions, ChoicesContextValue};
use crate::error::Result;
use crate::params::{ParamsController, ParamsOptions};
use crate::resolver::{
    ChoicesQuery, ChoicesResolver, EnableGetChoices, ResolvedChoices, ResolverCaches,
};
use crate::status::{ReferenceStatus, reference_status};

/// Turns typed search text into filter values.
pub type FilterToQuery = Arc<dyn Fn(&str) -> FilterValues + Send + Sync>;

/// Default search mapping: `{"q": text}`.
pub fn default_filter_to_query() -> FilterToQuery {
    Arc::new(|text: &str| {
        let mut filter = FilterValues::new();
        filter.insert("q".to_string(), Value::String(text.to_string()));
        filter
    })
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Construction options for a [`ReferenceInputController`].
#[derive(Clone)]
pub struct ReferenceInputOptions {
    /// Referenced resource.
    pub reference: String,
    /// Form field holding the selected id(s).
    pub source: String,
    /// Candidate page size.
    pub per_page: u32,
    /// Candidate sort.
    pub sort: SortPayload,
    /// Search debounce.
    pub debounce: Duration,
    /// Permanent filter, applied over the user's filter.
    pub filter: FilterValues,
    /// Search text mapping.
    pub filter_to_query: FilterToQuery,
    /// Candidate fetch predicate.
    pub enable_get_choices: Option<EnableGetChoices>,
    /// Provider metadata.
    pub meta: Option<Value>,
}

impl fmt::Debug for ReferenceInputOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceInputOptions")
            .field("reference", &self.reference)
            .field("source", &self.source)
            .field("per_page", &self.per_page)
            .field("sort", &self.sort)
            .field("debounce", &self.debounce)
            .field("filter", &self.filter)
            .field("enable_get_choices", &self.enable_get_choices.is_some())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl ReferenceInputOptions {
    /// Options for a `source` field referencing `reference`: 25 per page,
    /// newest id first.
    pub fn new(reference: &str, source: &str) -> Self {
        Self::from_defaults(reference, source, &ReferenceDefaults::default())
    }

    /// Options seeded from configuration.
    pub fn from_defaults(reference: &str, source: &str, defaults: &ReferenceDefaults) -> Self {
        Self {
            reference: reference.to_string(),
            source: source.to_string(),
            per_page: defaults.per_page,
            sort: defaults.sort.clone(),
            debounce: Duration::from_millis(defaults.debounce_ms),
            filter: FilterValues::new(),
            filter_to_query: default_filter_to_query(),
            enable_get_choices: None,
            meta: None,
        }
    }

    /// Set the candidate page size.
    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Set the candidate sort.
    #[must_use]
    pub fn with_sort(mut self, sort: SortPayload) -> Self {
        self.sort = sort;
        self
    }

    /// Set the search debounce.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the permanent filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterValues) -> Self {
        self.filter = filter;
        self
    }

    /// Set the search text mapping.
    #[must_use]
    pub fn with_filter_to_query(
        mut self,
        filter_to_query: impl Fn(&str) -> FilterValues + Send + Sync + 'static,
    ) -> Self {
        self.filter_to_query = Arc::new(filter_to_query);
        self
    }

    /// Only fetch candidates when `predicate` accepts the filter.
    ///
    /// The predicate sees the user's filter (search text and displayed
    /// filters), not the permanent filter.
    #[must_use]
    pub fn with_enable_get_choices(
        mut self,
        predicate: impl Fn(&FilterValues) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.enable_get_choices = Some(Arc::new(predicate));
        self
    }

    /// Set provider metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

struct ReferenceInner {
    options: ReferenceInputOptions,
    params: ParamsController,
    resolver: ChoicesResolver,
    value: Mutex<Value>,
}

/// Controller behind a reference input.
#[derive(Clone)]
pub struct ReferenceInputController {
    inner: Arc<ReferenceInner>,
}

impl fmt::Debug for ReferenceInputController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceInputController")
            .field("options", &self.inner.options)
            .field("params", &self.inner.params)
            .field("value", &*self.inner.lock_value())
            .finish()
    }
}

impl ReferenceInputController {
    /// Create a controller.
    ///
    /// `scheduler` drives params coalescing and search debouncing; by-id
    /// lookups go through `lookup`, which has its own scheduler.
    pub fn new(
        options: ReferenceInputOptions,
        lookup: BatchedLookup,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self::with_caches(options, lookup, scheduler, ResolverCaches::default())
    }

    /// Create a controller sharing response caches with other inputs.
    pub fn with_caches(
        options: ReferenceInputOptions,
        lookup: BatchedLookup,
        scheduler: Arc<dyn Scheduler>,
        caches: ResolverCaches,
    ) -> Self {
        let params_options = ParamsOptions::new(&options.reference)
            .with_per_page(options.per_page)
            .with_sort(options.sort.clone())
            .with_debounce(options.debounce)
            .with_store_key(None);
        let params = ParamsController::new(params_options, scheduler);

        let resolver = ChoicesResolver::new(lookup).with_caches(caches);

        Self {
            inner: Arc::new(ReferenceInner {
                options,
                params,
                resolver,
                value: Mutex::new(Value::Null),
            }),
        }
    }

    /// Params controller for the candidate query.
    pub fn params(&self) -> &ParamsController {
        &self.inner.params
    }

    /// Current field value.
    pub fn value(&self) -> Value {
        self.inner.lock_value().clone()
    }

    /// Update the field value, typically from the form binding.
    pub fn set_value(&self, value: Value) {
        *self.inner.lock_value() = value;
    }

    /// Map search text to filter values and apply them, debounced.
    pub fn set_search_text(&self, text: &str) {
        let filter = (self.inner.options.filter_to_query)(text);
        self.inner.params.set_filters(filter, None, true);
    }

    /// Candidate query for the committed params.
    pub fn query(&self) -> ChoicesQuery {
        self.inner.query()
    }

    /// Resolve choices for the committed params and current value.
    pub async fn resolve(&self) -> ResolvedChoices {
        self.inner.resolve().await
    }

    /// Last resolve result, with loading flags for a running resolve.
    pub fn snapshot(&self) -> ResolvedChoices {
        self.inner.resolver.snapshot()
    }

    /// Missing-reference status of the current value.
    ///
    /// Until a resolve has completed for the current value, the status is
    /// `waiting` rather than judged against records fetched for another one.
    pub fn status(&self) -> ReferenceStatus {
        let value = self.value();
        let ids = Identifier::list_from_value(&value);
        let resolved_ids = self.inner.resolver.resolved_ids();
        if !ids.is_empty() && resolved_ids.as_deref() != Some(ids.as_slice()) {
            return ReferenceStatus {
                waiting: true,
                ..ReferenceStatus::default()
            };
        }
        reference_status(&self.snapshot(), &value)
    }

    /// Resolve and package the result for choice inputs.
    pub async fn context(&self) -> ChoicesContextValue {
        let choices = self.resolve().await;
        let params = self.inner.params.params();
        ChoicesContextValue {
            choices,
            page: params.page,
            per_page: params.per_page,
            sort: params.sort,
            filter_values: params.filter,
            displayed_filters: params.displayed_filters,
            resource: Some(self.inner.options.reference.clone()),
            source: self.inner.options.source.clone(),
            actions: Arc::clone(&self.inner) as Arc<dyn ChoicesActions>,
        }
    }

    /// Stop pending params changes.
    pub fn dispose(&self) {
        self.inner.params.dispose();
    }
}

impl ReferenceInner {
    fn lock_value(&self) -> MutexGuard<'_, Value> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query(&self) -> ChoicesQuery {
        let params: QueryState = self.params.params();
        let mut query = ChoicesQuery::from_params(
            &self.options.reference,
            &self.options.source,
            &params,
        );
        query.enabled = self
            .options
            .enable_get_choices
            .as_ref()
            .is_none_or(|predicate| predicate(&params.filter));
        for (key, value) in &self.options.filter {
            query.filter.insert(key.clone(), value.clone());
        }
        query.meta = self.options.meta.clone();
        query
    }

    async fn resolve(&self) -> ResolvedChoices {
        let query = self.query();
        let value = self.lock_value().clone();
        self.resolver.resolve(&query, &value).await
    }
}

impl fmt::Debug for ReferenceInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceInner")
            .field("reference", &self.options.reference)
            .field("source", &self.options.source)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChoicesActions for ReferenceInner {
    fn set_filters(
        &self,
        filter: FilterValues,
        displayed_filters: Option<DisplayedFilters>,
        debounce: bool,
    ) {
        self.params.set_filters(filter, displayed_filters, debounce);
    }

    fn set_page(&self, page: u32) {
        self.params.set_page(page);
    }

    fn set_per_page(&self, per_page: u32) {
        self.params.set_per_page(per_page);
    }

    fn set_sort(&self, sort: SortPayload) {
        self.params.set_sort(sort);
    }

    fn show_filter(&self, filter_name: &str, default_value: Option<Value>) {
        self.params.show_filter(filter_name, default_value);
    }

    fn hide_filter(&self, filter_name: &str) {
        self.params.hide_filter(filter_name);
    }

    async fn refetch(&self) -> Result<ResolvedChoices> {
        self.resolver.invalidate(&self.options.reference);
        Ok(self.resolve().await)
    }
}
