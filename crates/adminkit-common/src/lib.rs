//! Shared utilities for the adminkit crates.
//!
//! - [`logging`] - `tracing` subscriber setup used by embedding applications
//! - [`path`] - dotted-path access into JSON record and form trees
//! - [`sanitize`] - removal of empty filter values before they reach a query

pub mod logging;
pub mod path;
pub mod sanitize;

pub use path::{flatten_object, get_path, remove_path, set_path};
pub use sanitize::{is_empty_value, remove_empty};
