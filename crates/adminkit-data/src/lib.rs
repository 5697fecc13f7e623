//! Backend access for adminkit.
//!
//! - [`DataProvider`] - the list / by-id contract, with [`MemoryProvider`] for tests and embedding
//! - [`Scheduler`] - deferred tasks, real ([`TokioScheduler`]) or virtual ([`ManualScheduler`])
//! - [`Debouncer`] - trailing-edge debounce on a scheduler
//! - [`QueryCache`] - single-flight, fingerprint-keyed result cache
//! - [`BatchedLookup`] - one `get_many` per resource per tick

pub mod batch;
pub mod cache;
pub mod debounce;
pub mod error;
pub mod memory;
pub mod provider;
pub mod scheduler;

pub use batch::BatchedLookup;
pub use cache::{CacheKey, QueryCache};
pub use debounce::Debouncer;
pub use error::{DataError, Result};
pub use memory::{MemoryProvider, ProviderCall, apply_list_query, filter_records, sort_records};
pub use provider::{
    DataProvider, GetListParams, GetListResult, GetManyParams, GetManyResult, PageInfo,
};
pub use scheduler::{ManualScheduler, Scheduler, Task, TaskHandle, TokioScheduler};
