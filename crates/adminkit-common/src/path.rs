//! Dotted-path access into JSON trees.
//!
//! A path such as `author.name` or `tags.0.label` addresses nested object keys
//! and array indexes. Records, filters and form values all use this notation.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Look up the value at `path`. An empty path returns the root.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `value` at `path`, creating intermediate objects (or arrays for
/// numeric segments) as needed. Scalars on the way are replaced.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    if path.is_empty() {
        *root = value;
        return;
    }
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        let next_is_index = segments
            .get(i + 1)
            .is_some_and(|next| next.parse::<usize>().is_ok());
        let index = segment.parse::<usize>().ok();

        if !(current.is_array() && index.is_some()) && !current.is_object() {
            *current = Value::Object(Map::new());
        }

        current = match current {
            Value::Array(items) => {
                let Some(index) = index else {
                    return;
                };
                while items.len() <= index {
                    items.push(Value::Null);
                }
                if last {
                    items[index] = value;
                    return;
                }
                let slot = &mut items[index];
                if !slot.is_object() && !slot.is_array() {
                    *slot = empty_container(next_is_index);
                }
                slot
            }
            Value::Object(map) => {
                if last {
                    map.insert((*segment).to_string(), value);
                    return;
                }
                let entry = map
                    .entry((*segment).to_string())
                    .or_insert_with(|| empty_container(next_is_index));
                if !entry.is_object() && !entry.is_array() {
                    *entry = empty_container(next_is_index);
                }
                entry
            }
            _ => return,
        };
    }
}

/// Remove and return the value at `path`. Array elements are removed by index,
/// shifting the following elements.
pub fn remove_path(root: &mut Value, path: &str) -> Option<Value> {
    let (parent_path, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (Some(parent), key),
        None => (None, path),
    };
    let parent = match parent_path {
        Some(parent_path) => get_path_mut(root, parent_path)?,
        None => root,
    };
    match parent {
        Value::Object(map) => map.remove(key),
        Value::Array(items) => {
            let index = key.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

fn get_path_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

fn empty_container(array: bool) -> Value {
    if array {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// Flatten nested objects into dotted keys: `{a: {b: 1}}` becomes `{"a.b": 1}`.
///
/// Arrays and scalars are leaves.
pub fn flatten_object(map: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(map, None, &mut out);
    out
}

fn flatten_into(map: &Map<String, Value>, prefix: Option<&str>, out: &mut BTreeMap<String, Value>) {
    for (key, value) in map {
        let full = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(inner, Some(&full), out),
            _ => {
                out.insert(full, value.clone());
            }
        }
    }
}
