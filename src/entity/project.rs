// src/entity/project.rs
use serde_json::Value;

use super::Record;

/// Copy the allow-listed fields of `raw`; a missing field becomes `null`.
/// Values are moved across untouched (amounts stay strings).
pub fn pick(raw: &Record, fields: &[&str]) -> Record {
    fields
        .iter()
        .map(|f| (f.to_string(), raw.get(*f).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Project every object of the list-valued field `name`.
/// Missing, `null`, empty or non-list values all yield `[]`.
pub fn pick_list(raw: &Record, name: &str, fields: &[&str]) -> Value {
    let items = match raw.get(name) {
        Some(Value::Array(items)) => items,
        _ => return Value::Array(Vec::new()),
    };
    Value::Array(
        items
            .iter()
            .filter_map(Value::as_object)
            .map(|item| Value::Object(pick(item, fields)))
            .collect(),
    )
}
