//! List query state: pagination, sort and filters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Filter values keyed by (possibly dotted) field name.
pub type FilterValues = Map<String, Value>;

/// Which filters are currently shown in the UI.
pub type DisplayedFilters = BTreeMap<String, bool>;

// =============================================================================
// SORT
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending.
    #[default]
    #[serde(rename = "ASC")]
    Asc,
    /// Descending.
    #[serde(rename = "DESC")]
    Desc,
}

impl SortOrder {
    /// The opposite direction.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    /// Wire label (`ASC` / `DESC`).
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort field and direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortPayload {
    /// Field to sort on (dotted path allowed).
    pub field: String,
    /// Direction.
    pub order: SortOrder,
}

impl SortPayload {
    /// Create a sort payload.
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }

    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Asc)
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Desc)
    }
}

impl Default for SortPayload {
    fn default() -> Self {
        Self::asc("id")
    }
}

// =============================================================================
// PAGINATION
// =============================================================================

/// 1-based page and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Page number, starting at 1.
    pub page: u32,
    /// Records per page.
    pub per_page: u32,
}

impl Pagination {
    /// Create a pagination, clamping both values to at least 1.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Index of the first record on this page.
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.per_page as usize
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

// =============================================================================
// QUERY STATE
// =============================================================================

/// Complete list query state owned by one params controller.
///
/// # Invariant
///
/// Every filter marked `true` in `displayed_filters` has a key in `filter`
/// (possibly holding `""`). See [`QueryState::satisfies_display_invariant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    /// Page number, starting at 1.
    pub page: u32,
    /// Records per page.
    pub per_page: u32,
    /// Sort field and order.
    pub sort: SortPayload,
    /// Filter values.
    #[serde(default)]
    pub filter: FilterValues,
    /// Filters shown in the UI.
    #[serde(default)]
    pub displayed_filters: DisplayedFilters,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            sort: SortPayload::default(),
            filter: FilterValues::new(),
            displayed_filters: DisplayedFilters::new(),
        }
    }
}

impl QueryState {
    /// Pagination part of the state.
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.per_page)
    }

    /// Whether each displayed filter has an entry in `filter`.
    pub fn satisfies_display_invariant(&self) -> bool {
        self.displayed_filters
            .iter()
            .filter(|(_, shown)| **shown)
            .all(|(name, _)| self.filter.contains_key(name))
    }

    /// Whether the state differs from a freshly initialised one.
    ///
    /// Persisted params are only restored when they are custom; otherwise the
    /// caller's defaults (including filter defaults) apply.
    pub fn has_custom_params(&self, defaults: &QueryState) -> bool {
        !self.filter.is_empty()
            || self.page != 1
            || self.per_page != defaults.per_page
            || self.sort != defaults.sort
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sort_order_toggles() {
        assert_eq!(SortOrder::Asc.toggled(), SortOrder::Desc);
        assert_eq!(SortOrder::Desc.toggled(), SortOrder::Asc);
        assert_eq!(SortOrder::Desc.to_string(), "DESC");
    }

    #[test]
    fn pagination_clamps_and_offsets() {
        let pagination = Pagination::new(0, 0);
        assert_eq!(pagination, Pagination { page: 1, per_page: 1 });
        assert_eq!(Pagination::new(3, 25).offset(), 50);
    }

    #[test]
    fn display_invariant() {
        let mut state = QueryState::default();
        state.displayed_filters.insert("q".to_string(), true);
        assert!(!state.satisfies_display_invariant());
        state.filter.insert("q".to_string(), json!(""));
        assert!(state.satisfies_display_invariant());
        state.displayed_filters.insert("hidden".to_string(), false);
        assert!(state.satisfies_display_invariant());
    }

    #[test]
    fn custom_params_detection() {
        let defaults = QueryState::default();
        assert!(!defaults.has_custom_params(&defaults));
        let paged = QueryState {
            page: 2,
            ..QueryState::default()
        };
        assert!(paged.has_custom_params(&defaults));
        let sorted = QueryState {
            sort: SortPayload::desc("title"),
            ..QueryState::default()
        };
        assert!(sorted.has_custom_params(&defaults));
    }
}
