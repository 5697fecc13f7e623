//! Choices from a static record list, filtered, sorted and paginated in
//! memory.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use adminkit_common::remove_empty;
use adminkit_data::{GetListParams, apply_list_query};
use adminkit_model::{
    DisplayedFilters, FilterValues, Identifier, QueryState, Record, SortOrder, SortPayload,
};

use crate::context::{ChoicesActions, ChoicesContextValue};
use crate::error::{ChoicesError, Result};
use crate::reducer::{QueryAction, reduce};
use crate::resolver::{ResolvedChoices, merge_choices, page_flags};

#[derive(Debug)]
struct LocalInner {
    source: String,
    data: Vec<Record>,
    value: Mutex<Value>,
    state: Mutex<QueryState>,
}

/// In-memory choices for an input given a static list.
///
/// Mutators apply immediately; there is nothing to fetch, so
/// [`ChoicesActions::refetch`] fails with [`ChoicesError::RefetchUnavailable`].
#[derive(Debug, Clone)]
pub struct LocalChoices {
    inner: Arc<LocalInner>,
}

impl LocalChoices {
    /// Choices for `source`, all on one page, unsorted.
    pub fn new(source: &str, choices: Vec<Record>) -> Self {
        let per_page = u32::try_from(choices.len()).unwrap_or(u32::MAX).max(1);
        let state = QueryState {
            per_page,
            sort: SortPayload::new("", SortOrder::Asc),
            ..QueryState::default()
        };
        Self {
            inner: Arc::new(LocalInner {
                source: source.to_string(),
                data: choices,
                value: Mutex::new(Value::Null),
                state: Mutex::new(state),
            }),
        }
    }

    /// Set the selected value.
    #[must_use]
    pub fn with_value(self, value: Value) -> Self {
        self.set_value(value);
        self
    }

    /// Set the initial sort.
    #[must_use]
    pub fn with_sort(self, sort: SortPayload) -> Self {
        self.inner.lock_state().sort = sort;
        self
    }

    /// Set the page size.
    #[must_use]
    pub fn with_per_page(self, per_page: u32) -> Self {
        self.inner.lock_state().per_page = per_page.max(1);
        self
    }

    /// Update the selected value.
    pub fn set_value(&self, value: Value) {
        *self
            .inner
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Current params.
    pub fn params(&self) -> QueryState {
        self.inner.lock_state().clone()
    }

    /// Choices for the current params and value.
    pub fn resolved(&self) -> ResolvedChoices {
        self.inner.resolved()
    }

    /// Context value for an input.
    pub fn context(&self) -> ChoicesContextValue {
        let params = self.params();
        ChoicesContextValue {
            choices: self.resolved(),
            page: params.page,
            per_page: params.per_page,
            sort: params.sort,
            filter_values: params.filter,
            displayed_filters: params.displayed_filters,
            resource: None,
            source: self.inner.source.clone(),
            actions: Arc::clone(&self.inner) as Arc<dyn ChoicesActions>,
        }
    }
}

impl LocalInner {
    fn lock_state(&self) -> MutexGuard<'_, QueryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, action: &QueryAction) {
        let mut state = self.lock_state();
        *state = reduce(&state, action);
    }

    fn resolved(&self) -> ResolvedChoices {
        let state = self.lock_state().clone();
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner).clone();

        let params = GetListParams {
            pagination: state.pagination(),
            sort: state.sort.clone(),
            filter: remove_empty(&state.filter),
            meta: None,
        };
        let page = apply_list_query(&self.data, &params);
        let selected: Vec<Record> = Identifier::list_from_value(&value)
            .iter()
            .filter_map(|id| self.data.iter().find(|record| record.id() == id))
            .cloned()
            .collect();

        let (has_next_page, has_previous_page) =
            page_flags(None, page.total, params.pagination);
        let (all_choices, total) = merge_choices(&page.data, &selected, page.total);
        ResolvedChoices {
            all_choices,
            available_choices: page.data,
            selected_choices: selected,
            total,
            has_next_page,
            has_previous_page,
            ..ResolvedChoices::default()
        }
    }
}

#[async_trait]
impl ChoicesActions for LocalInner {
    fn set_filters(
        &self,
        filter: FilterValues,
        displayed_filters: Option<DisplayedFilters>,
        _debounce: bool,
    ) {
        let mut state = self.lock_state();
        let action = QueryAction::SetFilter {
            filter: remove_empty(&filter),
            displayed_filters: displayed_filters
                .unwrap_or_else(|| state.displayed_filters.clone()),
        };
        *state = reduce(&state, &action);
    }

    fn set_page(&self, page: u32) {
        self.dispatch(&QueryAction::SetPage(page));
    }

    fn set_per_page(&self, per_page: u32) {
        self.dispatch(&QueryAction::SetPerPage(per_page));
    }

    fn set_sort(&self, sort: SortPayload) {
        self.dispatch(&QueryAction::SetSort(sort));
    }

    fn show_filter(&self, filter_name: &str, default_value: Option<Value>) {
        self.dispatch(&QueryAction::ShowFilter {
            filter_name: filter_name.to_string(),
            default_value,
        });
    }

    fn hide_filter(&self, filter_name: &str) {
        self.dispatch(&QueryAction::HideFilter(filter_name.to_string()));
    }

    async fn refetch(&self) -> Result<ResolvedChoices> {
        Err(ChoicesError::RefetchUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn genres() -> Vec<Record> {
        vec![
            Record::new("sf").with("name", "Science fiction"),
            Record::new("fantasy").with("name", "Fantasy"),
            Record::new("poetry").with("name", "Poetry"),
        ]
    }

    #[test]
    fn everything_on_one_page_by_default() {
        let choices = LocalChoices::new("genre", genres());
        let resolved = choices.resolved();
        assert_eq!(resolved.available_choices.len(), 3);
        assert_eq!(resolved.total, Some(3));
        assert_eq!(resolved.has_next_page, Some(false));
    }

    #[test]
    fn filters_and_sorts_in_memory() {
        let choices = LocalChoices::new("genre", genres()).with_sort(SortPayload::asc("name"));
        let context = choices.context();
        let mut filter = FilterValues::new();
        filter.insert("q".to_string(), json!("f"));
        context.actions.set_filters(filter, None, true);

        let names: Vec<_> = choices
            .resolved()
            .available_choices
            .iter()
            .filter_map(|record| record.get("name").cloned())
            .collect();
        assert_eq!(names, vec![json!("Fantasy"), json!("Science fiction")]);
    }

    #[test]
    fn selected_value_outside_page_is_prepended() {
        let choices = LocalChoices::new("genre", genres())
            .with_per_page(1)
            .with_value(json!("poetry"));
        let resolved = choices.resolved();
        assert_eq!(resolved.available_choices[0].id(), &Identifier::from("sf"));
        assert_eq!(resolved.all_choices[0].id(), &Identifier::from("poetry"));
        assert_eq!(resolved.total, Some(4));
    }

    #[tokio::test]
    async fn refetch_is_unavailable() {
        let context = LocalChoices::new("genre", genres()).context();
        assert_eq!(
            context.actions.refetch().await,
            Err(ChoicesError::RefetchUnavailable)
        );
    }
}
