//! Operations over the recursive content tree.
//!
//! Content is a `serde_json::Value` built with the `preserve_order` feature,
//! so every `Map` keeps its keys in document order. Structural validation
//! relies on that order, and so does the content hash.

use serde::Serialize;
use serde_json::{Map, Value};

/// Canonical compact serialization in document order.
///
/// Key order is part of the content: two documents that differ only in key
/// order produce different strings.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            for (i, (key, child)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(child, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Number of leaf values (anything that is not a mapping).
pub fn count_leaf_keys(value: &Value) -> usize {
    match value {
        Value::Object(map) => map.values().map(count_leaf_keys).sum(),
        _ => 1,
    }
}

/// Dotted paths of every leaf, in document order.
pub fn leaf_paths(value: &Value) -> Vec<String> {
    leaf_key_paths(value)
        .iter()
        .map(|segments| segments.join("."))
        .collect()
}

/// Key segments of every leaf, in document order. Empty mappings have no
/// leaves and contribute nothing.
pub fn leaf_key_paths(value: &Value) -> Vec<Vec<String>> {
    let mut paths = Vec::new();
    if let Value::Object(map) = value {
        collect_paths(map, &mut Vec::new(), &mut paths);
    }
    paths
}

fn collect_paths(map: &Map<String, Value>, prefix: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
    for (key, value) in map {
        prefix.push(key.clone());
        match value {
            Value::Object(child) if !child.is_empty() => collect_paths(child, prefix, paths),
            Value::Object(_) => {}
            _ => paths.push(prefix.clone()),
        }
        prefix.pop();
    }
}

/// Append `key` to a dotted path.
pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

pub fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, segment| current.as_object()?.get(*segment))
}

/// Set `path` to `new_value`, creating (or replacing non-mapping) intermediate
/// nodes with empty mappings. An empty path replaces the whole value.
pub fn set_path(value: &mut Value, path: &[&str], new_value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *value = new_value;
        return;
    };

    let mut current = value;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = match current {
            Value::Object(map) => map,
            _ => unreachable!("just replaced with a mapping"),
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), new_value);
    }
}

/// Remove the value at `path`, returning it. Parent mappings are left in place;
/// use [`prune_empty_parents`] afterwards.
pub fn delete_path(value: &mut Value, path: &[&str]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut current = value;
    for segment in parents {
        current = current.as_object_mut()?.get_mut(*segment)?;
    }
    current.as_object_mut()?.shift_remove(*last)
}

/// Drop the ancestors of `path` that are now empty mappings, innermost
/// first. Stops at the first ancestor that still has children or that `keep`
/// accepts. The root is never removed.
pub fn prune_empty_parents(value: &mut Value, path: &[&str], keep: impl Fn(&[&str]) -> bool) {
    for depth in (1..path.len()).rev() {
        let parent = &path[..depth];
        let emptied = matches!(get_path(value, parent), Some(Value::Object(m)) if m.is_empty());
        if !emptied || keep(parent) {
            break;
        }
        delete_path(value, parent);
    }
}

/// Build the minimal document containing only `path` set to `leaf`.
pub fn nest_path(path: &[&str], leaf: Value) -> Value {
    let mut root = Value::Object(Map::new());
    set_path(&mut root, path, leaf);
    root
}

/// Right-biased recursive merge: mappings merge key by key, anything else in
/// `overlay` replaces what is in `base`. Keys new to `base` are appended in
/// `overlay` order, so merging the same inputs in the same order is
/// deterministic.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Reorder every mapping in `value` to follow the key order of the same
/// mapping in `template`. Keys unknown to the template keep their relative
/// order after the known ones.
pub fn align_key_order(template: &Value, value: &mut Value) {
    let (Value::Object(order), Value::Object(map)) = (template, value) else {
        return;
    };

    let mut aligned = Map::with_capacity(map.len());
    for key in order.keys() {
        if let Some((key, mut child)) = map.shift_remove_entry(key) {
            if let Some(child_template) = order.get(&key) {
                align_key_order(child_template, &mut child);
            }
            aligned.insert(key, child);
        }
    }
    aligned.append(map);
    *map = aligned;
}

/// Pretty JSON with a trailing newline, used for every file the pipeline writes.
pub fn to_pretty_string<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}
