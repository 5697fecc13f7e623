//! Records served by a resource.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use adminkit_common::get_path;

use crate::error::{ModelError, Result};
use crate::identifier::Identifier;

/// A record: a JSON object that carries an `id`.
///
/// The id is parsed once at construction; the raw object (including `id`) is
/// kept so dotted-path lookups see exactly what the backend returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Record {
    id: Identifier,
    fields: Map<String, Value>,
}

impl Record {
    /// Create a record holding only its id.
    pub fn new(id: impl Into<Identifier>) -> Self {
        let id = id.into();
        let mut fields = Map::new();
        fields.insert("id".to_string(), id.to_value());
        Self { id, fields }
    }

    /// Builder-style field setter. Setting `id` is ignored.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if key != "id" {
            self.fields.insert(key.to_string(), value.into());
        }
        self
    }

    /// Build a record from an arbitrary JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::try_from(map),
            other => Err(ModelError::NotAnObject {
                kind: json_kind(&other),
            }),
        }
    }

    /// The record id.
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// Value at a dotted path (`author.name`, `tags.0`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = self.fields.get(head)?;
        match rest {
            Some(rest) => get_path(value, rest),
            None => Some(value),
        }
    }

    /// All fields, including `id`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl TryFrom<Map<String, Value>> for Record {
    type Error = ModelError;

    fn try_from(fields: Map<String, Value>) -> Result<Self> {
        let id = fields.get("id").ok_or(ModelError::MissingId)?;
        let id = Identifier::from_value(id)?;
        Ok(Self { id, fields })
    }
}

impl From<Record> for Map<String, Value> {
    fn from(record: Record) -> Self {
        record.fields
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
