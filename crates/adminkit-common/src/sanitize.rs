//! Empty-value handling for filters and validators.

use serde_json::{Map, Value};

/// Whether a value counts as "not provided": `null`, `""` or an empty array.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Remove `""` and `null` leaves, recursively.
///
/// Nested objects that end up empty are removed as well, so a cleared text
/// field never lingers in an outgoing query. Arrays are kept as they are.
pub fn remove_empty(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::Object(inner) => {
                let cleaned = remove_empty(inner);
                (!cleaned.is_empty()).then(|| (key.clone(), Value::Object(cleaned)))
            }
            _ => Some((key.clone(), value.clone())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn drops_empty_strings_and_nulls() {
        let cleaned = remove_empty(&as_map(json!({"a": "", "b": "x", "c": null, "d": 0})));
        assert_eq!(Value::Object(cleaned), json!({"b": "x", "d": 0}));
    }

    #[test]
    fn drops_nested_objects_left_empty() {
        let cleaned = remove_empty(&as_map(json!({
            "author": {"name": "", "age": null},
            "meta": {"kind": "post", "tag": ""},
            "ids": []
        })));
        assert_eq!(
            Value::Object(cleaned),
            json!({"meta": {"kind": "post"}, "ids": []})
        );
    }

    #[test]
    fn false_and_zero_are_values() {
        assert!(!is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!(0)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&Value::Null));
    }
}
