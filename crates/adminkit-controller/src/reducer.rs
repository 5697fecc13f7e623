//! Query state transitions.
//!
//! [`reduce`] is the only way list query state changes. It is pure: the input
//! state is borrowed and a new state is returned.

use serde_json::Value;

use adminkit_model::{DisplayedFilters, FilterValues, QueryState, SortOrder, SortPayload};

/// A change to list query state.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryAction {
    /// Replace the sort.
    SetSort(SortPayload),
    /// Sort on `field`, flipping the order if it is already the sort field.
    ToggleSort {
        /// Field to sort on.
        field: String,
    },
    /// Go to a page. Values below 1 clamp to 1.
    SetPage(u32),
    /// Change the page size. 0 clamps to 1.
    SetPerPage(u32),
    /// Replace the filter values and displayed filters wholesale.
    SetFilter {
        /// New filter values.
        filter: FilterValues,
        /// New displayed filters.
        displayed_filters: DisplayedFilters,
    },
    /// Display a filter, seeding its value when it has none.
    ShowFilter {
        /// Filter to display.
        filter_name: String,
        /// Value seeded when the filter has no value yet (`""` when `None`).
        default_value: Option<Value>,
    },
    /// Hide a filter and drop its value.
    HideFilter(String),
}

/// Apply `action` to `state`.
///
/// Sort, page size and filter changes reset the page to 1.
pub fn reduce(state: &QueryState, action: &QueryAction) -> QueryState {
    let mut next = state.clone();
    match action {
        QueryAction::SetSort(sort) => {
            next.sort = sort.clone();
            next.page = 1;
        }
        QueryAction::ToggleSort { field } => {
            next.sort = if state.sort.field == *field {
                SortPayload::new(field.clone(), state.sort.order.toggled())
            } else {
                SortPayload::new(field.clone(), SortOrder::Asc)
            };
            next.page = 1;
        }
        QueryAction::SetPage(page) => {
            next.page = (*page).max(1);
        }
        QueryAction::SetPerPage(per_page) => {
            next.per_page = (*per_page).max(1);
            next.page = 1;
        }
        QueryAction::SetFilter {
            filter,
            displayed_filters,
        } => {
            next.filter = filter.clone();
            next.displayed_filters = displayed_filters.clone();
            for (name, shown) in displayed_filters {
                if *shown && !next.filter.contains_key(name) {
                    next.filter.insert(name.clone(), Value::String(String::new()));
                }
            }
            next.page = 1;
        }
        QueryAction::ShowFilter {
            filter_name,
            default_value,
        } => {
            next.displayed_filters.insert(filter_name.clone(), true);
            if !next.filter.contains_key(filter_name) {
                let seed = default_value
                    .clone()
                    .unwrap_or_else(|| Value::String(String::new()));
                next.filter.insert(filter_name.clone(), seed);
            }
        }
        QueryAction::HideFilter(filter_name) => {
            next.displayed_filters.remove(filter_name);
            next.filter.remove(filter_name);
        }
    }
    next
}
