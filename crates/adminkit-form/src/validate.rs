//! Field validators.
//!
//! A [`Validator`] answers either right away or with a future, through
//! [`ValidationOutcome`]. [`compose_validators`] chains validators left to
//! right and stops at the first error.
//!
//! Built-in validators report translation keys (`ra.validation.*`), with
//! arguments when the message needs them.

use std::fmt;
use std::sync::{Arc, LazyLock};

use futures_util::future::BoxFuture;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use adminkit_common::is_empty_value;

/// Same shape as the usual HTML5-ish email check: local part, `@`, then an
/// IPv4 literal or a dotted domain with a TLD of two letters or more.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("Invalid email regex")
});

// =============================================================================
// ERRORS AND OUTCOMES
// =============================================================================

/// A failed validation: a message (usually a translation key), optionally
/// with interpolation arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValidationError {
    /// Plain message.
    Message(String),
    /// Message with arguments.
    WithArgs {
        message: String,
        args: Map<String, Value>,
    },
}

impl ValidationError {
    /// Plain message error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Message with arguments.
    pub fn with_args(message: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::WithArgs {
            message: message.into(),
            args,
        }
    }

    /// The message or translation key.
    pub fn key(&self) -> &str {
        match self {
            Self::Message(message) | Self::WithArgs { message, .. } => message,
        }
    }

    /// Interpolation arguments, if any.
    pub fn args(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Message(_) => None,
            Self::WithArgs { args, .. } => Some(args),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Result of running a validator: immediate, or still being computed.
pub enum ValidationOutcome {
    /// The answer is known; `None` means valid.
    Ready(Option<ValidationError>),
    /// The answer comes from a future (e.g. a backend check).
    Pending(BoxFuture<'static, Option<ValidationError>>),
}

impl ValidationOutcome {
    /// Immediate success.
    pub fn valid() -> Self {
        Self::Ready(None)
    }

    /// Immediate failure.
    pub fn invalid(error: ValidationError) -> Self {
        Self::Ready(Some(error))
    }

    /// Whether the answer must be awaited.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Wait for the answer.
    pub async fn resolve(self) -> Option<ValidationError> {
        match self {
            Self::Ready(error) => error,
            Self::Pending(future) => future.await,
        }
    }
}

impl fmt::Debug for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(error) => f.debug_tuple("Ready").field(error).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

// =============================================================================
// VALIDATOR TRAIT
// =============================================================================

/// Checks one field value. `values` is the whole form.
pub trait Validator: Send + Sync {
    /// Validate `value`.
    fn validate(&self, value: &Value, values: &Value) -> ValidationOutcome;

    /// Whether this validator makes the field required.
    fn is_required(&self) -> bool {
        false
    }
}

/// Shared validator handle.
pub type SharedValidator = Arc<dyn Validator>;

/// Adapter turning a closure into a [`Validator`].
pub struct FnValidator<F>(F);

/// Build a synchronous validator from a closure.
pub fn validator_fn<F>(check: F) -> FnValidator<F>
where
    F: Fn(&Value, &Value) -> Option<ValidationError> + Send + Sync,
{
    FnValidator(check)
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value, &Value) -> Option<ValidationError> + Send + Sync,
{
    fn validate(&self, value: &Value, values: &Value) -> ValidationOutcome {
        ValidationOutcome::Ready((self.0)(value, values))
    }
}

/// Adapter turning an async closure into a [`Validator`].
pub struct AsyncFnValidator<F>(F);

/// Build an asynchronous validator from a closure returning a boxed future.
pub fn async_validator_fn<F>(check: F) -> AsyncFnValidator<F>
where
    F: Fn(&Value, &Value) -> BoxFuture<'static, Option<ValidationError>> + Send + Sync,
{
    AsyncFnValidator(check)
}

impl<F> Validator for AsyncFnValidator<F>
where
    F: Fn(&Value, &Value) -> BoxFuture<'static, Option<ValidationError>> + Send + Sync,
{
    fn validate(&self, value: &Value, values: &Value) -> ValidationOutcome {
        ValidationOutcome::Pending((self.0)(value, values))
    }
}

// =============================================================================
// COMPOSITION
// =============================================================================

/// Validators run left to right, stopping at the first error.
#[derive(Clone, Default)]
pub struct ComposedValidator {
    validators: Arc<[SharedValidator]>,
}

impl fmt::Debug for ComposedValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedValidator")
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Chain `validators`.
///
/// The chain answers immediately while every validator does. Once one of
/// them is asynchronous, the rest of the chain runs after it resolves and the
/// outcome is [`ValidationOutcome::Pending`], even when it ends up valid.
pub fn compose_validators(validators: Vec<SharedValidator>) -> ComposedValidator {
    ComposedValidator {
        validators: validators.into(),
    }
}

impl ComposedValidator {
    /// Number of chained validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Validator for ComposedValidator {
    fn validate(&self, value: &Value, values: &Value) -> ValidationOutcome {
        for (index, validator) in self.validators.iter().enumerate() {
            match validator.validate(value, values) {
                ValidationOutcome::Ready(None) => {}
                ValidationOutcome::Ready(Some(error)) => return ValidationOutcome::invalid(error),
                ValidationOutcome::Pending(first) => {
                    let rest = Arc::clone(&self.validators);
                    let value = value.clone();
                    let values = values.clone();
                    return ValidationOutcome::Pending(Box::pin(async move {
                        if let Some(error) = first.await {
                            return Some(error);
                        }
                        for validator in rest.iter().skip(index + 1) {
                            if let Some(error) = validator.validate(&value, &values).resolve().await
                            {
                                return Some(error);
                            }
                        }
                        None
                    }));
                }
            }
        }
        ValidationOutcome::valid()
    }

    fn is_required(&self) -> bool {
        self.validators.iter().any(|validator| validator.is_required())
    }
}

// =============================================================================
// BUILT-IN VALIDATORS
// =============================================================================

#[derive(Debug, Clone)]
enum Rule {
    Required,
    MinLength(usize),
    MaxLength(usize),
    MinValue(f64),
    MaxValue(f64),
    Number,
    Pattern(Regex),
    Choices(Vec<Value>),
}

/// One of the built-in validators, with an optional custom message.
#[derive(Debug, Clone)]
pub struct BuiltinValidator {
    rule: Rule,
    message: String,
}

impl BuiltinValidator {
    fn new(rule: Rule, message: &str) -> Self {
        Self {
            rule,
            message: message.to_string(),
        }
    }

    /// Replace the default message key.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn fail(&self, args: Option<Value>) -> Option<ValidationError> {
        Some(match args {
            Some(Value::Object(args)) => ValidationError::with_args(&self.message, args),
            _ => ValidationError::message(&self.message),
        })
    }
}

/// Value must not be null, `""` or an empty array.
pub fn required() -> BuiltinValidator {
    BuiltinValidator::new(Rule::Required, "ra.validation.required")
}

/// String or array length must be at least `min`.
pub fn min_length(min: usize) -> BuiltinValidator {
    BuiltinValidator::new(Rule::MinLength(min), "ra.validation.minLength")
}

/// String or array length must be at most `max`.
pub fn max_length(max: usize) -> BuiltinValidator {
    BuiltinValidator::new(Rule::MaxLength(max), "ra.validation.maxLength")
}

/// Numeric value must be at least `min`.
pub fn min_value(min: f64) -> BuiltinValidator {
    BuiltinValidator::new(Rule::MinValue(min), "ra.validation.minValue")
}

/// Numeric value must be at most `max`.
pub fn max_value(max: f64) -> BuiltinValidator {
    BuiltinValidator::new(Rule::MaxValue(max), "ra.validation.maxValue")
}

/// Value must read as a number.
pub fn number() -> BuiltinValidator {
    BuiltinValidator::new(Rule::Number, "ra.validation.number")
}

/// String value must match `pattern`.
pub fn regex(pattern: Regex) -> BuiltinValidator {
    BuiltinValidator::new(Rule::Pattern(pattern), "ra.validation.regex")
}

/// String value must look like an email address.
pub fn email() -> BuiltinValidator {
    BuiltinValidator::new(Rule::Pattern(EMAIL_REGEX.clone()), "ra.validation.email")
}

/// Value must be one of `list`.
pub fn choices(list: Vec<Value>) -> BuiltinValidator {
    BuiltinValidator::new(Rule::Choices(list), "ra.validation.oneOf")
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

impl Validator for BuiltinValidator {
    fn validate(&self, value: &Value, _values: &Value) -> ValidationOutcome {
        let empty = is_empty_value(value);
        if empty {
            return ValidationOutcome::Ready(match self.rule {
                Rule::Required => self.fail(None),
                _ => None,
            });
        }

        let error = match &self.rule {
            Rule::Required => None,
            Rule::MinLength(min) => length_of(value)
                .is_some_and(|len| len < *min)
                .then(|| self.fail(Some(json!({ "min": min }))))
                .flatten(),
            Rule::MaxLength(max) => length_of(value)
                .is_some_and(|len| len > *max)
                .then(|| self.fail(Some(json!({ "max": max }))))
                .flatten(),
            Rule::MinValue(min) => as_number(value)
                .is_some_and(|n| n < *min)
                .then(|| self.fail(Some(json!({ "min": min }))))
                .flatten(),
            Rule::MaxValue(max) => as_number(value)
                .is_some_and(|n| n > *max)
                .then(|| self.fail(Some(json!({ "max": max }))))
                .flatten(),
            Rule::Number => as_number(value)
                .is_none_or(f64::is_nan)
                .then(|| self.fail(None))
                .flatten(),
            Rule::Pattern(pattern) => match value {
                Value::String(s) if !pattern.is_match(s) => {
                    self.fail(Some(json!({ "pattern": pattern.as_str() })))
                }
                _ => None,
            },
            Rule::Choices(list) => (!list.contains(value))
                .then(|| self.fail(Some(json!({ "list": list }))))
                .flatten(),
        };
        ValidationOutcome::Ready(error)
    }

    fn is_required(&self) -> bool {
        matches!(self.rule, Rule::Required)
    }
}
