//! Backend uniqueness check.
//!
//! [`UniqueValidator`] asks the backend whether another record already holds
//! the value. Checks are debounced: while the user types, only the last value
//! reaches the backend and earlier checks resolve as valid.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::oneshot;

use adminkit_common::{is_empty_value, set_path};
use adminkit_data::{DataProvider, Debouncer, GetListParams, Scheduler};
use adminkit_model::{FilterValues, Identifier, Pagination, SortPayload, ValidationSettings};

use crate::validate::{ValidationError, ValidationOutcome, Validator};

/// Message key for a value already in use.
pub const UNIQUE_MESSAGE: &str = "ra.validation.unique";

/// Message key for a failed check.
pub const HTTP_ERROR_MESSAGE: &str = "ra.notification.http_error";

/// What to check and how.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueOptions {
    /// Resource to search.
    pub resource: String,
    /// Field holding the value, as a dotted path.
    pub source: String,
    /// Extra filter combined with the value.
    pub filter: FilterValues,
    /// Quiet period before the backend is asked.
    pub debounce: Duration,
    /// Error message key.
    pub message: String,
    /// Id of the record being edited; a match on it is not a conflict.
    pub record_id: Option<Identifier>,
    /// Field label used in the message arguments; defaults to `source`.
    pub field_label: Option<String>,
}

impl UniqueOptions {
    /// Check `source` among the records of `resource`.
    pub fn new(resource: &str, source: &str) -> Self {
        Self::from_settings(resource, source, &ValidationSettings::default())
    }

    /// Options seeded from configuration.
    pub fn from_settings(resource: &str, source: &str, settings: &ValidationSettings) -> Self {
        Self {
            resource: resource.to_string(),
            source: source.to_string(),
            filter: FilterValues::new(),
            debounce: Duration::from_millis(settings.unique_debounce_ms),
            message: UNIQUE_MESSAGE.to_string(),
            record_id: None,
            field_label: None,
        }
    }

    /// Set the extra filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterValues) -> Self {
        self.filter = filter;
        self
    }

    /// Set the debounce.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the message key.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the record being edited.
    #[must_use]
    pub fn with_record_id(mut self, id: impl Into<Identifier>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    /// Set the field label.
    #[must_use]
    pub fn with_field_label(mut self, label: impl Into<String>) -> Self {
        self.field_label = Some(label.into());
        self
    }

    fn list_params(&self, value: &Value) -> GetListParams {
        let mut filter = Value::Object(self.filter.clone());
        set_path(&mut filter, &self.source, value.clone());
        let filter = match filter {
            Value::Object(filter) => filter,
            _ => Map::new(),
        };
        GetListParams {
            pagination: Pagination::new(1, 1),
            sort: SortPayload::asc("id"),
            filter,
            meta: None,
        }
    }
}

type Answer = oneshot::Sender<Option<ValidationError>>;

struct UniqueInner {
    options: UniqueOptions,
    provider: Arc<dyn DataProvider>,
    debouncer: Debouncer,
    waiting: Mutex<Option<Answer>>,
}

/// Debounced backend uniqueness validator.
#[derive(Clone)]
pub struct UniqueValidator {
    inner: Arc<UniqueInner>,
}

impl fmt::Debug for UniqueValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueValidator")
            .field("options", &self.inner.options)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl UniqueValidator {
    /// Create a validator; `scheduler` drives the debounce.
    pub fn new(
        provider: Arc<dyn DataProvider>,
        scheduler: Arc<dyn Scheduler>,
        options: UniqueOptions,
    ) -> Self {
        let debouncer = Debouncer::new(scheduler, options.debounce);
        Self {
            inner: Arc::new(UniqueInner {
                options,
                provider,
                debouncer,
                waiting: Mutex::new(None),
            }),
        }
    }

    /// Whether a check waits for its quiet period.
    pub fn is_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Drop the pending check; its caller sees no error.
    pub fn cancel(&self) {
        self.inner.debouncer.cancel();
        if let Some(answer) = self.inner.lock().take() {
            let _ = answer.send(None);
        }
    }
}

impl UniqueInner {
    fn lock(&self) -> MutexGuard<'_, Option<Answer>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(self: Arc<Self>, value: Value) {
        let Some(answer) = self.lock().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let outcome = self.check(&value).await;
                    let _ = answer.send(outcome);
                });
            }
            Err(_) => {
                tracing::warn!(resource = %self.options.resource, "No runtime for uniqueness check");
                let _ = answer.send(None);
            }
        }
    }

    async fn check(&self, value: &Value) -> Option<ValidationError> {
        let options = &self.options;
        let params = options.list_params(value);
        match self.provider.get_list(&options.resource, params).await {
            Ok(result) => {
                let total = result.total.unwrap_or(result.data.len() as u64);
                let is_self = |id: &Identifier| options.record_id.as_ref() == Some(id);
                if total == 0 || result.data.iter().any(|record| is_self(record.id())) {
                    return None;
                }
                tracing::debug!(
                    resource = %options.resource,
                    source = %options.source,
                    "Value already taken"
                );
                let field = options.field_label.as_deref().unwrap_or(&options.source);
                let mut args = Map::new();
                args.insert("field".to_string(), Value::String(field.to_string()));
                args.insert("value".to_string(), value.clone());
                Some(ValidationError::with_args(&options.message, args))
            }
            Err(error) => {
                tracing::warn!(resource = %options.resource, %error, "Uniqueness check failed");
                Some(ValidationError::message(HTTP_ERROR_MESSAGE))
            }
        }
    }
}

impl Validator for UniqueValidator {
    fn validate(&self, value: &Value, _values: &Value) -> ValidationOutcome {
        if is_empty_value(value) {
            return ValidationOutcome::valid();
        }
        let (tx, rx) = oneshot::channel();
        if let Some(superseded) = self.inner.lock().replace(tx) {
            let _ = superseded.send(None);
        }
        let weak = Arc::downgrade(&self.inner);
        let value = value.clone();
        self.inner.debouncer.call(Box::new(move || {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.start(value);
            }
        }));

        ValidationOutcome::Pending(Box::pin(async move { rx.await.unwrap_or(None) }))
    }
}
