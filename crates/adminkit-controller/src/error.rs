//! Error types for the choices layer.

use thiserror::Error;

/// Misuse of the choices API. Fetch failures are not errors here; they are
/// reported in [`crate::ResolvedChoices::error`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChoicesError {
    /// An input asked for choices with neither static choices nor an
    /// enclosing reference context.
    #[error("no choices source: pass static choices or use the input inside a reference context")]
    MissingChoicesSource,

    /// The choices are in memory and cannot be fetched again.
    #[error("refetch is not available for static choices")]
    RefetchUnavailable,
}

/// Result type alias for choices operations.
pub type Result<T> = std::result::Result<T, ChoicesError>;
