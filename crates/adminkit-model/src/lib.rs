//! Core data types shared by every adminkit crate.
//!
//! - [`Identifier`] and [`Record`] - what a resource serves
//! - [`QueryState`], [`SortPayload`], [`Pagination`] - list query state
//! - [`AdminConfig`] - framework configuration loaded from TOML

pub mod config;
pub mod error;
pub mod identifier;
pub mod query;
pub mod record;

pub use config::{AdminConfig, BatchSettings, ListDefaults, ReferenceDefaults, ValidationSettings};
pub use error::{ConfigError, ModelError, Result};
pub use identifier::Identifier;
pub use query::{DisplayedFilters, FilterValues, Pagination, QueryState, SortOrder, SortPayload};
pub use record::Record;
