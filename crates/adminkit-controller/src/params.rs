//! Per-list query params with tick coalescing and debounced filters.
//!
//! A [`ParamsController`] owns one [`QueryState`]. Mutators issued during the
//! same scheduler tick are reduced into a single pending state and published
//! with one commit, so a handler that sets sort, page and page size produces
//! one state change and one outgoing query.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;

use adminkit_common::remove_empty;
use adminkit_data::{Debouncer, Scheduler, TaskHandle};
use adminkit_model::{
    DisplayedFilters, FilterValues, ListDefaults, QueryState, ReferenceDefaults, SortPayload,
};

use crate::reducer::{QueryAction, reduce};

// =============================================================================
// STORE
// =============================================================================

/// External storage for committed params, keyed by store key.
pub trait ParamsStore: Send + Sync + fmt::Debug {
    /// Params saved under `key`.
    fn load(&self, key: &str) -> Option<QueryState>;
    /// Save params under `key`.
    fn save(&self, key: &str, state: &QueryState);
    /// Forget params saved under `key`.
    fn remove(&self, key: &str);
}

/// In-memory [`ParamsStore`].
#[derive(Debug, Default)]
pub struct MemoryParamsStore {
    entries: Mutex<HashMap<String, QueryState>>,
}

impl MemoryParamsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueryState>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ParamsStore for MemoryParamsStore {
    fn load(&self, key: &str) -> Option<QueryState> {
        self.lock().get(key).cloned()
    }

    fn save(&self, key: &str, state: &QueryState) {
        self.lock().insert(key.to_string(), state.clone());
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Construction options for a [`ParamsController`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsOptions {
    /// Resource the params query.
    pub resource: String,
    /// Initial page size.
    pub per_page: u32,
    /// Initial sort.
    pub sort: SortPayload,
    /// Filter values applied when no custom params were persisted.
    pub filter_default_values: FilterValues,
    /// Quiet period for debounced filter changes.
    pub debounce: Duration,
    /// Key under which committed params are persisted; `None` disables persistence.
    pub store_key: Option<String>,
}

impl ParamsOptions {
    /// List params for `resource`, persisted under `<resource>.listParams`.
    pub fn new(resource: &str) -> Self {
        Self::from_list_defaults(resource, &ListDefaults::default())
    }

    /// List params seeded from configuration.
    pub fn from_list_defaults(resource: &str, defaults: &ListDefaults) -> Self {
        Self {
            resource: resource.to_string(),
            per_page: defaults.per_page,
            sort: defaults.sort.clone(),
            filter_default_values: FilterValues::new(),
            debounce: Duration::from_millis(defaults.debounce_ms),
            store_key: Some(format!("{resource}.listParams")),
        }
    }

    /// Reference candidate params seeded from configuration. Not persisted.
    pub fn from_reference_defaults(resource: &str, defaults: &ReferenceDefaults) -> Self {
        Self {
            resource: resource.to_string(),
            per_page: defaults.per_page,
            sort: defaults.sort.clone(),
            filter_default_values: FilterValues::new(),
            debounce: Duration::from_millis(defaults.debounce_ms),
            store_key: None,
        }
    }

    /// Set the initial page size.
    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Set the initial sort.
    #[must_use]
    pub fn with_sort(mut self, sort: SortPayload) -> Self {
        self.sort = sort;
        self
    }

    /// Set the default filter values.
    #[must_use]
    pub fn with_filter_defaults(mut self, filter: FilterValues) -> Self {
        self.filter_default_values = filter;
        self
    }

    /// Set the debounce period for filter changes.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set or clear the persistence key.
    #[must_use]
    pub fn with_store_key(mut self, store_key: Option<String>) -> Self {
        self.store_key = store_key;
        self
    }

    fn default_state(&self) -> QueryState {
        QueryState {
            page: 1,
            per_page: self.per_page.max(1),
            sort: self.sort.clone(),
            filter: self.filter_default_values.clone(),
            displayed_filters: DisplayedFilters::new(),
        }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Identifies a subscription made with [`ParamsController::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&QueryState) + Send + Sync>;

struct ParamsState {
    committed: QueryState,
    pending: Option<QueryState>,
    commit_task: Option<TaskHandle>,
    commit_count: u64,
    disposed: bool,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

struct ParamsInner {
    options: ParamsOptions,
    scheduler: Arc<dyn Scheduler>,
    store: Option<Arc<dyn ParamsStore>>,
    debouncer: Debouncer,
    state: Mutex<ParamsState>,
}

/// Owner of one list's query params.
#[derive(Clone)]
pub struct ParamsController {
    inner: Arc<ParamsInner>,
}

impl fmt::Debug for ParamsController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ParamsController")
            .field("resource", &self.inner.options.resource)
            .field("committed", &state.committed)
            .field("pending", &state.pending.is_some())
            .field("commit_count", &state.commit_count)
            .finish()
    }
}

impl ParamsController {
    /// Create a controller without persistence.
    pub fn new(options: ParamsOptions, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::build(options, scheduler, None)
    }

    /// Create a controller persisting commits to `store`.
    ///
    /// Persisted params are restored only if they differ from the defaults;
    /// otherwise the default filter values apply.
    pub fn with_store(
        options: ParamsOptions,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn ParamsStore>,
    ) -> Self {
        Self::build(options, scheduler, Some(store))
    }

    fn build(
        options: ParamsOptions,
        scheduler: Arc<dyn Scheduler>,
        store: Option<Arc<dyn ParamsStore>>,
    ) -> Self {
        let defaults = options.default_state();
        let baseline = QueryState {
            filter: FilterValues::new(),
            ..defaults.clone()
        };
        let persisted = match (&store, &options.store_key) {
            (Some(store), Some(key)) => store.load(key),
            _ => None,
        };
        let committed = match persisted {
            Some(state) if state.has_custom_params(&baseline) => {
                tracing::debug!(resource = %options.resource, "Restored persisted list params");
                state
            }
            _ => defaults,
        };

        let debouncer = Debouncer::new(Arc::clone(&scheduler), options.debounce);
        Self {
            inner: Arc::new(ParamsInner {
                options,
                scheduler,
                store,
                debouncer,
                state: Mutex::new(ParamsState {
                    committed,
                    pending: None,
                    commit_task: None,
                    commit_count: 0,
                    disposed: false,
                    listeners: Vec::new(),
                    next_subscription: 0,
                }),
            }),
        }
    }

    /// Resource the params query.
    pub fn resource(&self) -> &str {
        &self.inner.options.resource
    }

    /// Committed params.
    pub fn params(&self) -> QueryState {
        self.inner.lock().committed.clone()
    }

    /// Committed filter with empty leaves removed, as sent to the backend.
    pub fn query_filter(&self) -> FilterValues {
        remove_empty(&self.inner.lock().committed.filter)
    }

    /// Whether changes are waiting for the next commit.
    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    /// Number of commits published so far.
    pub fn commit_count(&self) -> u64 {
        self.inner.lock().commit_count
    }

    /// Go to `page`.
    pub fn set_page(&self, page: u32) {
        self.inner.apply(|_| QueryAction::SetPage(page));
    }

    /// Change the page size.
    pub fn set_per_page(&self, per_page: u32) {
        self.inner.apply(|_| QueryAction::SetPerPage(per_page));
    }

    /// Replace the sort.
    pub fn set_sort(&self, sort: SortPayload) {
        self.inner.apply(|_| QueryAction::SetSort(sort));
    }

    /// Sort on `field`, flipping the order when it is already sorted on.
    pub fn toggle_sort(&self, field: &str) {
        let field = field.to_string();
        self.inner.apply(|_| QueryAction::ToggleSort { field });
    }

    /// Display a filter, seeding it with `default_value` when unset.
    pub fn show_filter(&self, filter_name: &str, default_value: Option<Value>) {
        let filter_name = filter_name.to_string();
        self.inner.apply(|_| QueryAction::ShowFilter {
            filter_name,
            default_value,
        });
    }

    /// Hide a filter and drop its value.
    pub fn hide_filter(&self, filter_name: &str) {
        let filter_name = filter_name.to_string();
        self.inner.apply(|_| QueryAction::HideFilter(filter_name));
    }

    /// Replace the filter values.
    ///
    /// Empty strings and nulls are removed first. `displayed_filters: None`
    /// keeps the displayed filters as they are when the change applies. With
    /// `debounce`, only the last call of a burst applies, once the quiet
    /// period has passed.
    pub fn set_filters(
        &self,
        filter: FilterValues,
        displayed_filters: Option<DisplayedFilters>,
        debounce: bool,
    ) {
        let filter = remove_empty(&filter);
        if !debounce {
            ParamsInner::apply_filters(&self.inner, filter, displayed_filters);
            return;
        }
        if self.inner.lock().disposed {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        self.inner.debouncer.call(Box::new(move || {
            if let Some(inner) = Weak::upgrade(&weak) {
                ParamsInner::apply_filters(&inner, filter, displayed_filters);
            }
        }));
    }

    /// Call `listener` with the new params after each commit.
    pub fn subscribe(&self, listener: impl Fn(&QueryState) + Send + Sync + 'static) -> SubscriptionId {
        let mut state = self.inner.lock();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.lock().listeners.retain(|(existing, _)| *existing != id);
    }

    /// Stop the controller: pending and debounced changes are dropped and
    /// later mutator calls do nothing.
    pub fn dispose(&self) {
        let mut state = self.inner.lock();
        state.disposed = true;
        state.pending = None;
        if let Some(task) = state.commit_task.take() {
            task.cancel();
        }
        state.listeners.clear();
        drop(state);
        self.inner.debouncer.cancel();
        tracing::debug!(resource = %self.inner.options.resource, "Disposed params controller");
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }
}

impl ParamsInner {
    fn lock(&self) -> MutexGuard<'_, ParamsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_filters(
        self: &Arc<Self>,
        filter: FilterValues,
        displayed_filters: Option<DisplayedFilters>,
    ) {
        self.apply(|base| QueryAction::SetFilter {
            filter,
            displayed_filters: displayed_filters
                .unwrap_or_else(|| base.displayed_filters.clone()),
        });
    }

    /// Reduce an action into the pending state, scheduling a commit if this
    /// is the first change of the tick.
    fn apply(self: &Arc<Self>, make_action: impl FnOnce(&QueryState) -> QueryAction) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }
        let first = state.pending.is_none();
        let base = state.pending.as_ref().unwrap_or(&state.committed);
        let action = make_action(base);
        let next = reduce(base, &action);
        tracing::trace!(resource = %self.options.resource, ?action, first, "Queued params action");
        state.pending = Some(next);

        if first {
            let weak = Arc::downgrade(self);
            let task = self.scheduler.schedule(
                Duration::ZERO,
                Box::new(move || {
                    if let Some(inner) = Weak::upgrade(&weak) {
                        inner.commit();
                    }
                }),
            );
            state.commit_task = Some(task);
        }
    }

    fn commit(&self) {
        let (committed, listeners) = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            let Some(pending) = state.pending.take() else {
                return;
            };
            state.commit_task = None;
            state.committed = pending;
            state.commit_count += 1;
            let listeners: Vec<Listener> = state
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            (state.committed.clone(), listeners)
        };

        tracing::debug!(
            resource = %self.options.resource,
            page = committed.page,
            per_page = committed.per_page,
            sort = %committed.sort.field,
            order = %committed.sort.order,
            "Committed list params"
        );
        if let (Some(store), Some(key)) = (&self.store, &self.options.store_key) {
            store.save(key, &committed);
        }
        for listener in listeners {
            listener(&committed);
        }
    }
}
