//! The choices context consumed by choice inputs.
//!
//! Inputs never talk to the backend or to params directly. They read a
//! [`ChoicesContextValue`] and call its [`ChoicesActions`]. The value comes
//! either from static choices ([`LocalChoices`]) or from an enclosing
//! reference input ([`crate::ReferenceInputController`]).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use adminkit_model::{DisplayedFilters, FilterValues, Record, SortPayload};

use crate::error::{ChoicesError, Result};
use crate::local::LocalChoices;
use crate::resolver::ResolvedChoices;

/// Mutators available to a choices consumer.
#[async_trait]
pub trait ChoicesActions: Send + Sync + fmt::Debug {
    /// Replace the filter values. `None` keeps the displayed filters.
    fn set_filters(
        &self,
        filter: FilterValues,
        displayed_filters: Option<DisplayedFilters>,
        debounce: bool,
    );

    /// Go to a page.
    fn set_page(&self, page: u32);

    /// Change the page size.
    fn set_per_page(&self, per_page: u32);

    /// Replace the sort.
    fn set_sort(&self, sort: SortPayload);

    /// Display a filter.
    fn show_filter(&self, filter_name: &str, default_value: Option<Value>);

    /// Hide a filter.
    fn hide_filter(&self, filter_name: &str);

    /// Fetch the choices again, bypassing cached responses.
    async fn refetch(&self) -> Result<ResolvedChoices>;
}

/// Resolved choices plus the query they were resolved for, and the actions
/// that change it.
#[derive(Debug, Clone)]
pub struct ChoicesContextValue {
    /// Resolved records and flags.
    pub choices: ResolvedChoices,
    /// Current page.
    pub page: u32,
    /// Current page size.
    pub per_page: u32,
    /// Current sort.
    pub sort: SortPayload,
    /// Current filter values.
    pub filter_values: FilterValues,
    /// Currently displayed filters.
    pub displayed_filters: DisplayedFilters,
    /// Resource the choices come from, if any.
    pub resource: Option<String>,
    /// Form field the input is bound to.
    pub source: String,
    /// Mutators.
    pub actions: Arc<dyn ChoicesActions>,
}

impl ChoicesContextValue {
    /// Every known choice, selected records first.
    pub fn all_choices(&self) -> &[Record] {
        &self.choices.all_choices
    }

    /// Whether the choices are still loading.
    pub fn is_loading(&self) -> bool {
        self.choices.is_loading
    }
}

impl fmt::Display for ChoicesContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} choices for '{}' (page {}, {} per page)",
            self.choices.all_choices.len(),
            self.source,
            self.page,
            self.per_page
        )
    }
}

/// Pick the choices an input should use.
///
/// Static choices win over the enclosing reference context, so the same input
/// works standalone and inside a reference input. With neither, the input is
/// misconfigured.
pub fn use_choices_context(
    ambient: Option<&ChoicesContextValue>,
    local: Option<&LocalChoices>,
) -> Result<ChoicesContextValue> {
    match (local, ambient) {
        (Some(local), _) => Ok(local.context()),
        (None, Some(ambient)) => Ok(ambient.clone()),
        (None, None) => Err(ChoicesError::MissingChoicesSource),
    }
}
