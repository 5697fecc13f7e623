//! Binding a field to the form.
//!
//! A binding starts [`BindingState::Uninitialized`] and becomes
//! [`BindingState::Bound`] once registered. Binding is where default values
//! are applied: through field resets, never plain writes, so that a freshly
//! opened form is not reported as dirty.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use adminkit_model::Record;

use crate::error::Result;
use crate::form::{FormApi, ResetOptions};
use crate::validate::{
    ComposedValidator, SharedValidator, ValidationError, ValidationOutcome, Validator,
    compose_validators,
};

/// Maps a stored value to what the input displays.
pub type Format = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Maps an input value to what the form stores.
pub type Parse = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Shows `null` as an empty string.
pub fn default_format(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        other => other.clone(),
    }
}

/// Stores an empty string as `null`.
pub fn default_parse(value: &Value) -> Value {
    match value {
        Value::String(s) if s.is_empty() => Value::Null,
        other => other.clone(),
    }
}

/// Lifecycle of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Not (or no longer) registered with the form.
    Uninitialized,
    /// Registered; defaults applied.
    Bound,
}

/// Options for [`FieldBinding::bind`] and [`ArrayFieldBinding::bind`].
#[derive(Clone)]
pub struct FieldOptions {
    /// Dotted path of the field.
    pub source: String,
    /// Value applied when neither the record nor the form has one.
    pub default_value: Option<Value>,
    /// Validators, run left to right.
    pub validators: Vec<SharedValidator>,
    /// Display mapping.
    pub format: Format,
    /// Storage mapping.
    pub parse: Parse,
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOptions")
            .field("source", &self.source)
            .field("default_value", &self.default_value)
            .field("validators", &self.validators.len())
            .finish_non_exhaustive()
    }
}

impl FieldOptions {
    /// Options for `source` with the default format and parse.
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            default_value: None,
            validators: Vec::new(),
            format: Arc::new(default_format),
            parse: Arc::new(default_parse),
        }
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Append a validator.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Set the display mapping.
    #[must_use]
    pub fn with_format(mut self, format: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.format = Arc::new(format);
        self
    }

    /// Set the storage mapping.
    #[must_use]
    pub fn with_parse(mut self, parse: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.parse = Arc::new(parse);
        self
    }
}

/// Whether a default should be applied: one is given, and neither the
/// record nor the form holds a value (`0` and `false` are values).
fn needs_default(
    form: &dyn FormApi,
    record: Option<&Record>,
    source: &str,
    default_value: Option<&Value>,
) -> bool {
    let unset = |value: Option<&Value>| value.is_none_or(Value::is_null);
    default_value.is_some()
        && unset(record.and_then(|record| record.get(source)))
        && unset(form.get_value(source).as_ref())
        && !form.is_dirty(source)
}

// =============================================================================
// SHARED CORE
// =============================================================================

struct BindingCore {
    form: Arc<dyn FormApi>,
    source: String,
    validator: ComposedValidator,
    state: Mutex<BindingState>,
}

impl BindingCore {
    fn register(
        form: Arc<dyn FormApi>,
        source: &str,
        validators: Vec<SharedValidator>,
    ) -> Result<Self> {
        form.register(source)?;
        Ok(Self {
            form,
            source: source.to_string(),
            validator: compose_validators(validators),
            state: Mutex::new(BindingState::Bound),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BindingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn raw_value(&self) -> Value {
        self.form.get_value(&self.source).unwrap_or(Value::Null)
    }

    fn validate(&self) -> ValidationOutcome {
        self.validator
            .validate(&self.raw_value(), &self.form.get_values())
    }

    async fn validate_and_record(&self) -> Option<ValidationError> {
        let error = self.validate().resolve().await;
        if *self.lock() == BindingState::Bound {
            self.form.set_error(&self.source, error.clone());
        }
        error
    }

    fn unbind(&self) {
        let mut state = self.lock();
        if *state == BindingState::Bound {
            self.form.unregister(&self.source);
            *state = BindingState::Uninitialized;
            tracing::trace!(source = %self.source, "Unbound field");
        }
    }
}

// =============================================================================
// SIMPLE FIELDS
// =============================================================================

/// Live binding of a simple field.
pub struct FieldBinding {
    core: BindingCore,
    format: Format,
    parse: Parse,
}

impl fmt::Debug for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("source", &self.core.source)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl FieldBinding {
    /// Register `options.source` with the form and apply its default value.
    ///
    /// `record` is the record being edited, if any. Fails when the field is
    /// already bound.
    pub fn bind(
        form: Arc<dyn FormApi>,
        record: Option<&Record>,
        options: FieldOptions,
    ) -> Result<Self> {
        let FieldOptions {
            source,
            default_value,
            validators,
            format,
            parse,
        } = options;
        let core = BindingCore::register(form, &source, validators)?;

        if needs_default(core.form.as_ref(), record, &source, default_value.as_ref()) {
            tracing::debug!(%source, "Applying field default");
            core.form.reset_field(&source, default_value);
        }
        Ok(Self { core, format, parse })
    }

    /// Field path.
    pub fn source(&self) -> &str {
        &self.core.source
    }

    /// Lifecycle state.
    pub fn state(&self) -> BindingState {
        *self.core.lock()
    }

    /// Value for display, after `format`.
    pub fn value(&self) -> Value {
        (self.format)(&self.core.raw_value())
    }

    /// Stored value, `null` when unset.
    pub fn raw_value(&self) -> Value {
        self.core.raw_value()
    }

    /// Store an input value, after `parse`.
    pub fn on_change(&self, input: &Value) {
        self.core.form.set_value(&self.core.source, (self.parse)(input));
    }

    /// Mark the field touched.
    pub fn on_blur(&self) {
        self.core.form.touch(&self.core.source);
    }

    /// Run the validators on the stored value.
    pub fn validate(&self) -> ValidationOutcome {
        self.core.validate()
    }

    /// Run the validators and record the outcome in the form.
    pub async fn validate_and_record(&self) -> Option<ValidationError> {
        self.core.validate_and_record().await
    }

    /// Recorded validation error.
    pub fn error(&self) -> Option<ValidationError> {
        self.core.form.error(&self.core.source)
    }

    /// Whether a validator makes this field required.
    pub fn is_required(&self) -> bool {
        self.core.validator.is_required()
    }

    /// Whether the value differs from its baseline.
    pub fn is_dirty(&self) -> bool {
        self.core.form.is_dirty(&self.core.source)
    }

    /// Whether the field was blurred.
    pub fn is_touched(&self) -> bool {
        self.core.form.is_touched(&self.core.source)
    }

    /// Release the field. Also done on drop.
    pub fn unbind(&self) {
        self.core.unbind();
    }
}

impl Drop for FieldBinding {
    fn drop(&mut self) {
        self.core.unbind();
    }
}

// =============================================================================
// ARRAY FIELDS
// =============================================================================

/// Stable identity of an array row, preserved across inserts, removals and
/// moves.
pub type RowKey = u64;

#[derive(Debug, Default)]
struct Rows {
    keys: Vec<RowKey>,
    next: RowKey,
}

impl Rows {
    fn fresh(&mut self) -> RowKey {
        let key = self.next;
        self.next += 1;
        key
    }

    fn renew(&mut self, len: usize) {
        let keys = (0..len).map(|_| self.fresh()).collect();
        self.keys = keys;
    }
}

/// Live binding of an array field.
pub struct ArrayFieldBinding {
    core: BindingCore,
    rows: Mutex<Rows>,
}

impl fmt::Debug for ArrayFieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayFieldBinding")
            .field("source", &self.core.source)
            .field("rows", &self.lock_rows().keys)
            .finish_non_exhaustive()
    }
}

impl ArrayFieldBinding {
    /// Register the array field and apply its default.
    ///
    /// A default array is installed with a replace followed by a form reset
    /// that keeps values, so the rows are in place and nothing reads as
    /// dirty. `format` and `parse` do not apply to arrays.
    pub fn bind(
        form: Arc<dyn FormApi>,
        record: Option<&Record>,
        options: FieldOptions,
    ) -> Result<Self> {
        let FieldOptions {
            source,
            default_value,
            validators,
            ..
        } = options;
        let core = BindingCore::register(form, &source, validators)?;

        if needs_default(core.form.as_ref(), record, &source, default_value.as_ref()) {
            let items = match default_value {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            tracing::debug!(%source, rows = items.len(), "Applying array default");
            core.form.replace_array(&source, items);
            core.form.reset(None, ResetOptions::keep_values());
        }

        let binding = Self {
            core,
            rows: Mutex::new(Rows::default()),
        };
        let len = binding.items().len();
        binding.lock_rows().renew(len);
        Ok(binding)
    }

    fn lock_rows(&self) -> MutexGuard<'_, Rows> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Field path.
    pub fn source(&self) -> &str {
        &self.core.source
    }

    /// Lifecycle state.
    pub fn state(&self) -> BindingState {
        *self.core.lock()
    }

    /// Current items.
    pub fn items(&self) -> Vec<Value> {
        match self.core.raw_value() {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }

    /// Row keys, in row order.
    pub fn keys(&self) -> Vec<RowKey> {
        self.lock_rows().keys.clone()
    }

    /// Rows with their keys.
    pub fn fields(&self) -> Vec<(RowKey, Value)> {
        self.keys().into_iter().zip(self.items()).collect()
    }

    /// Add a row at the end.
    pub fn append(&self, item: Value) -> Result<RowKey> {
        let len = self.lock_rows().keys.len();
        self.insert(len, item)
    }

    /// Insert a row at `index`.
    pub fn insert(&self, index: usize, item: Value) -> Result<RowKey> {
        let mut rows = self.lock_rows();
        self.core
            .form
            .insert_array_item(&self.core.source, index, item)?;
        let key = rows.fresh();
        let at = index.min(rows.keys.len());
        rows.keys.insert(at, key);
        Ok(key)
    }

    /// Remove the row at `index`.
    pub fn remove(&self, index: usize) -> Result<Value> {
        let mut rows = self.lock_rows();
        let item = self.core.form.remove_array_item(&self.core.source, index)?;
        if index < rows.keys.len() {
            rows.keys.remove(index);
        }
        Ok(item)
    }

    /// Move the row at `from` to `to`.
    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        let mut rows = self.lock_rows();
        self.core
            .form
            .move_array_item(&self.core.source, from, to)?;
        if from < rows.keys.len() && to < rows.keys.len() {
            let key = rows.keys.remove(from);
            rows.keys.insert(to, key);
        }
        Ok(())
    }

    /// Replace every row; all rows get new keys.
    pub fn replace(&self, items: Vec<Value>) {
        let mut rows = self.lock_rows();
        let len = items.len();
        self.core.form.replace_array(&self.core.source, items);
        rows.renew(len);
    }

    /// Run the validators on the whole array.
    pub fn validate(&self) -> ValidationOutcome {
        self.core.validate()
    }

    /// Run the validators and record the outcome in the form.
    pub async fn validate_and_record(&self) -> Option<ValidationError> {
        self.core.validate_and_record().await
    }

    /// Recorded validation error.
    pub fn error(&self) -> Option<ValidationError> {
        self.core.form.error(&self.core.source)
    }

    /// Whether the array differs from its baseline.
    pub fn is_dirty(&self) -> bool {
        self.core.form.is_dirty(&self.core.source)
    }

    /// Release the field. Also done on drop.
    pub fn unbind(&self) {
        self.core.unbind();
    }
}

impl Drop for ArrayFieldBinding {
    fn drop(&mut self) {
        self.core.unbind();
    }
}
