//! Error types for form binding.

use thiserror::Error;

/// Misuse of the form binding API. Validation failures are not errors; they
/// are [`crate::ValidationError`] values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FormError {
    /// A second binding was requested for a simple field.
    #[error("field '{field}' is already bound")]
    AlreadyRegistered { field: String },

    /// An array operation targeted a value that is not an array.
    #[error("field '{field}' does not hold an array")]
    NotAnArray { field: String },

    /// An array operation used an index past the end of the array.
    #[error("index {index} is out of bounds for field '{field}' ({len} items)")]
    IndexOutOfBounds {
        field: String,
        index: usize,
        len: usize,
    },
}

/// Result type alias for form operations.
pub type Result<T> = std::result::Result<T, FormError>;
