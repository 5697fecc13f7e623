//! Reference and choices controllers for adminkit.
//!
//! - [`reduce`] - query state transitions
//! - [`ParamsController`] - per-list params with tick coalescing and debounced filters
//! - [`ChoicesResolver`] - candidate page plus selected records, merged
//! - [`ReferenceInputController`] - params, resolver and current value for one input
//! - [`LocalChoices`] - the same surface over a static record list
//! - [`use_choices_context`] - picks the choices source for an input

pub mod context;
pub mod error;
pub mod local;
pub mod params;
pub mod reducer;
pub mod reference;
pub mod resolver;
pub mod status;

pub use context::{ChoicesActions, ChoicesContextValue, use_choices_context};
pub use error::{ChoicesError, Result};
pub use local::LocalChoices;
pub use params::{MemoryParamsStore, ParamsController, ParamsOptions, ParamsStore, SubscriptionId};
pub use reducer::{QueryAction, reduce};
pub use reference::{
    FilterToQuery, ReferenceInputController, ReferenceInputOptions, default_filter_to_query,
};
pub use resolver::{
    ChoicesQuery, ChoicesResolver, EnableGetChoices, ResolvedChoices, ResolverCaches,
    merge_choices, page_flags,
};
pub use status::{
    ALL_MISSING, MANY_MISSING, ReferenceStatus, SINGLE_MISSING, reference_status,
};
