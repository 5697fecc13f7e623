//! Record identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};

/// Identifier of a record in a resource: an integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    /// Numeric id.
    Int(i64),
    /// String id (UUIDs, slugs, ...).
    Str(String),
}

impl Identifier {
    /// Parse an identifier from a JSON scalar.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .ok_or_else(|| ModelError::InvalidIdentifier(n.to_string())),
            Value::String(s) => Ok(Self::Str(s.clone())),
            other => Err(ModelError::InvalidIdentifier(other.to_string())),
        }
    }

    /// Selected ids held by a reference field value.
    ///
    /// `null` selects nothing, an array selects each non-null element and a
    /// scalar selects itself. Values that are not valid ids are skipped.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .iter()
                .filter(|item| !item.is_null())
                .filter_map(|item| Self::from_value(item).ok())
                .collect(),
            scalar => Self::from_value(scalar).into_iter().collect(),
        }
    }

    /// Convert back to a JSON scalar.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Identifier {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_scalars() {
        assert_eq!(Identifier::from_value(&json!(5)), Ok(Identifier::Int(5)));
        assert_eq!(
            Identifier::from_value(&json!("abc")),
            Ok(Identifier::Str("abc".to_string()))
        );
        assert!(Identifier::from_value(&json!(1.5)).is_err());
        assert!(Identifier::from_value(&json!({"id": 1})).is_err());
    }

    #[test]
    fn selected_ids_from_field_values() {
        assert!(Identifier::list_from_value(&Value::Null).is_empty());
        assert_eq!(Identifier::list_from_value(&json!(1)), vec![Identifier::Int(1)]);
        assert_eq!(
            Identifier::list_from_value(&json!([1, null, "x"])),
            vec![Identifier::Int(1), Identifier::from("x")]
        );
        assert!(Identifier::list_from_value(&json!([])).is_empty());
    }

    #[test]
    fn untagged_serde() {
        let ids: Vec<Identifier> = serde_json::from_value(json!([1, "a"])).expect("deserialize ids");
        assert_eq!(ids, vec![Identifier::Int(1), Identifier::from("a")]);
        assert_eq!(Identifier::Int(7).to_string(), "7");
    }
}
