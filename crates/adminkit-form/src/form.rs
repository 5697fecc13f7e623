//! The form state a field binding talks to.
//!
//! [`FormApi`] is the small set of primitives bindings need from a form
//! library: value access, field and form resets that keep dirty tracking
//! honest, array operations, registration and per-field error/touched state.
//! [`MemoryForm`] implements it over a JSON value tree.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use adminkit_common::{get_path, set_path};

use crate::error::{FormError, Result};
use crate::validate::ValidationError;

/// How [`FormApi::reset`] treats the current state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Keep the current values; only the baseline they are compared to moves.
    pub keep_values: bool,
    /// Keep the baseline, so fields that were dirty stay dirty.
    pub keep_dirty: bool,
}

impl ResetOptions {
    /// Keep current values, make them the new baseline.
    pub fn keep_values() -> Self {
        Self {
            keep_values: true,
            keep_dirty: false,
        }
    }
}

/// Form primitives used by field bindings. Field names are dotted paths.
pub trait FormApi: Send + Sync + fmt::Debug {
    /// Current value at `name`; `None` when unset.
    fn get_value(&self, name: &str) -> Option<Value>;

    /// All current values.
    fn get_values(&self) -> Value;

    /// Write a value as the user would; the field becomes dirty if it now
    /// differs from its baseline.
    fn set_value(&self, name: &str, value: Value);

    /// Reset one field: with `default_value`, both its value and baseline
    /// become that value; without, the value goes back to the baseline.
    /// Clears the field's dirty, touched and error state.
    fn reset_field(&self, name: &str, default_value: Option<Value>);

    /// Reset the whole form. `values` becomes the new baseline (the current
    /// values when `None` and `keep_values` is set, the old baseline
    /// otherwise). Touched and error state are cleared.
    fn reset(&self, values: Option<Value>, options: ResetOptions);

    /// Swap the whole content of an array field.
    fn replace_array(&self, name: &str, items: Vec<Value>);

    /// Insert `item` at `index` (`index == len` appends).
    fn insert_array_item(&self, name: &str, index: usize, item: Value) -> Result<()>;

    /// Remove and return the item at `index`.
    fn remove_array_item(&self, name: &str, index: usize) -> Result<Value>;

    /// Move the item at `from` to `to`.
    fn move_array_item(&self, name: &str, from: usize, to: usize) -> Result<()>;

    /// Claim `name` for a binding.
    fn register(&self, name: &str) -> Result<()>;

    /// Release `name` and its error state.
    fn unregister(&self, name: &str);

    /// Set or clear the validation error of `name`.
    fn set_error(&self, name: &str, error: Option<ValidationError>);

    /// Validation error of `name`.
    fn error(&self, name: &str) -> Option<ValidationError>;

    /// Whether `name` differs from its baseline.
    fn is_dirty(&self, name: &str) -> bool;

    /// Whether `name` was blurred since the last reset.
    fn is_touched(&self, name: &str) -> bool;

    /// Mark `name` as touched.
    fn touch(&self, name: &str);
}

// =============================================================================
// MEMORY FORM
// =============================================================================

#[derive(Debug)]
struct FormState {
    values: Value,
    defaults: Value,
    registered: HashSet<String>,
    touched: HashSet<String>,
    errors: HashMap<String, ValidationError>,
}

/// In-memory [`FormApi`]. Dirty state is the difference between the current
/// values and the baseline.
#[derive(Debug)]
pub struct MemoryForm {
    state: Mutex<FormState>,
}

impl Default for MemoryForm {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl MemoryForm {
    /// A form whose values and baseline start as `values`.
    pub fn new(values: Value) -> Self {
        Self {
            state: Mutex::new(FormState {
                values: values.clone(),
                defaults: values,
                registered: HashSet::new(),
                touched: HashSet::new(),
                errors: HashMap::new(),
            }),
        }
    }

    /// Whether any field differs from its baseline.
    pub fn is_form_dirty(&self) -> bool {
        let state = self.lock();
        state.values != state.defaults
    }

    /// Baseline value at `name`.
    pub fn default_value(&self, name: &str) -> Option<Value> {
        get_path(&self.lock().defaults, name).cloned()
    }

    /// Whether `name` is claimed by a binding.
    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().registered.contains(name)
    }

    fn lock(&self) -> MutexGuard<'_, FormState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_array<T>(
        &self,
        name: &str,
        update: impl FnOnce(&mut Vec<Value>) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock();
        let mut items = match get_path(&state.values, name) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(FormError::NotAnArray {
                    field: name.to_string(),
                });
            }
        };
        let outcome = update(&mut items)?;
        set_path(&mut state.values, name, Value::Array(items));
        Ok(outcome)
    }
}

fn out_of_bounds(name: &str, index: usize, len: usize) -> FormError {
    FormError::IndexOutOfBounds {
        field: name.to_string(),
        index,
        len,
    }
}

fn is_within(name: &str, key: &str) -> bool {
    key == name
        || key
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with('.'))
}

impl FormApi for MemoryForm {
    fn get_value(&self, name: &str) -> Option<Value> {
        get_path(&self.lock().values, name).cloned()
    }

    fn get_values(&self) -> Value {
        self.lock().values.clone()
    }

    fn set_value(&self, name: &str, value: Value) {
        set_path(&mut self.lock().values, name, value);
    }

    fn reset_field(&self, name: &str, default_value: Option<Value>) {
        let mut state = self.lock();
        let FormState {
            values, defaults, ..
        } = &mut *state;
        match default_value {
            Some(value) => {
                set_path(defaults, name, value.clone());
                set_path(values, name, value);
            }
            None => {
                let baseline = get_path(defaults, name).cloned().unwrap_or(Value::Null);
                set_path(values, name, baseline);
            }
        }
        state.touched.retain(|key| !is_within(name, key));
        state.errors.retain(|key, _| !is_within(name, key));
    }

    fn reset(&self, values: Option<Value>, options: ResetOptions) {
        let mut state = self.lock();
        let baseline = match values {
            Some(values) => values,
            None if options.keep_values => state.values.clone(),
            None => state.defaults.clone(),
        };
        if !options.keep_values {
            state.values = baseline.clone();
        }
        if !options.keep_dirty {
            state.defaults = baseline;
        }
        state.touched.clear();
        state.errors.clear();
        tracing::trace!(?options, "Form reset");
    }

    fn replace_array(&self, name: &str, items: Vec<Value>) {
        set_path(&mut self.lock().values, name, Value::Array(items));
    }

    fn insert_array_item(&self, name: &str, index: usize, item: Value) -> Result<()> {
        self.update_array(name, |items| {
            if index > items.len() {
                return Err(out_of_bounds(name, index, items.len()));
            }
            items.insert(index, item);
            Ok(())
        })
    }

    fn remove_array_item(&self, name: &str, index: usize) -> Result<Value> {
        self.update_array(name, |items| {
            if index >= items.len() {
                return Err(out_of_bounds(name, index, items.len()));
            }
            Ok(items.remove(index))
        })
    }

    fn move_array_item(&self, name: &str, from: usize, to: usize) -> Result<()> {
        self.update_array(name, |items| {
            let len = items.len();
            if from >= len {
                return Err(out_of_bounds(name, from, len));
            }
            if to >= len {
                return Err(out_of_bounds(name, to, len));
            }
            let item = items.remove(from);
            items.insert(to, item);
            Ok(())
        })
    }

    fn register(&self, name: &str) -> Result<()> {
        if self.lock().registered.insert(name.to_string()) {
            Ok(())
        } else {
            Err(FormError::AlreadyRegistered {
                field: name.to_string(),
            })
        }
    }

    fn unregister(&self, name: &str) {
        let mut state = self.lock();
        state.registered.remove(name);
        state.errors.remove(name);
    }

    fn set_error(&self, name: &str, error: Option<ValidationError>) {
        let mut state = self.lock();
        match error {
            Some(error) => {
                state.errors.insert(name.to_string(), error);
            }
            None => {
                state.errors.remove(name);
            }
        }
    }

    fn error(&self, name: &str) -> Option<ValidationError> {
        self.lock().errors.get(name).cloned()
    }

    fn is_dirty(&self, name: &str) -> bool {
        let state = self.lock();
        let current = get_path(&state.values, name).unwrap_or(&Value::Null);
        let baseline = get_path(&state.defaults, name).unwrap_or(&Value::Null);
        current != baseline
    }

    fn is_touched(&self, name: &str) -> bool {
        self.lock().touched.contains(name)
    }

    fn touch(&self, name: &str) {
        self.lock().touched.insert(name.to_string());
    }
}
