//! Form field binding for adminkit inputs.
//!
//! - [`form`] - the [`FormApi`] primitives and an in-memory form
//! - [`binding`] - simple and array field bindings with default handling
//! - [`validate`] - validator trait, composition and built-in rules
//! - [`unique`] - debounced backend uniqueness check

pub mod binding;
pub mod error;
pub mod form;
pub mod unique;
pub mod validate;

pub use binding::{
    ArrayFieldBinding, BindingState, FieldBinding, FieldOptions, Format, Parse, RowKey,
    default_format, default_parse,
};
pub use error::{FormError, Result};
pub use form::{FormApi, MemoryForm, ResetOptions};
pub use unique::{HTTP_ERROR_MESSAGE, UNIQUE_MESSAGE, UniqueOptions, UniqueValidator};
pub use validate::{
    AsyncFnValidator, BuiltinValidator, ComposedValidator, FnValidator, SharedValidator,
    ValidationError, ValidationOutcome, Validator, async_validator_fn, choices,
    compose_validators, email, max_length, max_value, min_length, min_value, number, regex,
    required, validator_fn,
};
