use serde_json::{Map, Value};

use super::event::FieldValue;

const SEPARATOR: char = '_';

/// Flattens a nested reading into `(name, value)` pairs.
///
/// Nested objects are walked depth-first in their own key order and their
/// keys joined to the parent's with `_`. Arrays are kept as their JSON text.
/// Input that is already flat comes back unchanged.
pub fn flatten(tree: &Map<String, Value>) -> Vec<(String, FieldValue)> {
    let mut out = Vec::with_capacity(tree.len());
    flatten_into(None, tree, &mut out);
    out
}

fn flatten_into(prefix: Option<&str>, tree: &Map<String, Value>, out: &mut Vec<(String, FieldValue)>) {
    for (key, value) in tree {
        let name = match prefix {
            Some(p) => format!("{p}{SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(child) => flatten_into(Some(name.as_str()), child, out),
            other => out.push((name, scalar(other))),
        }
    }
}

fn scalar(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Int(i),
            None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
        },
        Value::String(s) => FieldValue::Str(s.clone()),
        Value::Array(_) => FieldValue::Str(value.to_string()),
        // objects are recursed into by the caller
        Value::Object(_) => FieldValue::Str(value.to_string()),
    }
}
