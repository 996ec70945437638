// src/warehouse/coerce.rs
//
// Schema coercion for loads: what the warehouse does to each JSON row before
// it is accepted. Integers must be integral, NUMERIC must be a decimal string
// (kept verbatim), timestamps are normalized to fixed-width UTC so they order
// lexically, records and repeated fields are validated and stored as JSON.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use crate::entity::schema::{FieldKind, FieldMode, FieldSchema};
use crate::entity::Record;

/// Stored timestamp layout; fixed width so `MAX()` on text is chronological.
pub const STORED_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const NUMERIC_MAX_INT_DIGITS: usize = 29;
const NUMERIC_MAX_SCALE: usize = 9;

/// Encode one row in schema column order.
pub fn encode_row(schema: &[FieldSchema], row: &Record) -> Result<Vec<SqlValue>, String> {
    schema
        .iter()
        .map(|field| encode_column(field, row.get(field.name).unwrap_or(&Value::Null)))
        .collect()
}

fn encode_column(field: &FieldSchema, v: &Value) -> Result<SqlValue, String> {
    if field.mode == FieldMode::Repeated || field.kind == FieldKind::Record {
        let checked = check_value(field, v, field.name)?;
        if checked.is_null() {
            return Ok(SqlValue::Null);
        }
        return serde_json::to_string(&checked)
            .map(SqlValue::Text)
            .map_err(|e| format!("{}: {e}", field.name));
    }

    match check_value(field, v, field.name)? {
        Value::Null => Ok(SqlValue::Null),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .ok_or_else(|| format!("{}: {n} is not an integer", field.name)),
        Value::String(s) => Ok(SqlValue::Text(s)),
        other => Err(format!("{}: unexpected value {other}", field.name)),
    }
}

/// Validate `v` against `field`, returning its canonical JSON form.
fn check_value(field: &FieldSchema, v: &Value, path: &str) -> Result<Value, String> {
    if field.mode == FieldMode::Repeated {
        let items = match v {
            Value::Null => return Ok(Value::Array(Vec::new())),
            Value::Array(items) => items,
            other => return Err(format!("{path}: expected a list, got {other}")),
        };
        return items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let item_path = format!("{path}[{i}]");
                if item.is_null() {
                    return Err(format!("{item_path}: null inside a repeated field"));
                }
                check_single(field, item, &item_path)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }

    if v.is_null() {
        if field.mode == FieldMode::Required {
            return Err(format!("{path}: required field is missing"));
        }
        return Ok(Value::Null);
    }
    check_single(field, v, path)
}

fn check_single(field: &FieldSchema, v: &Value, path: &str) -> Result<Value, String> {
    match field.kind {
        FieldKind::Integer => check_integer(v)
            .map(Value::from)
            .map_err(|e| format!("{path}: {e}")),
        FieldKind::String => match v {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(format!("{path}: expected a string, got {other}")),
        },
        FieldKind::Timestamp => match v {
            Value::String(s) => normalize_timestamp(s)
                .map(Value::String)
                .map_err(|e| format!("{path}: {e}")),
            other => Err(format!("{path}: expected a timestamp string, got {other}")),
        },
        FieldKind::Numeric => check_numeric(v)
            .map(Value::String)
            .map_err(|e| format!("{path}: {e}")),
        FieldKind::Record => {
            let obj = v
                .as_object()
                .ok_or_else(|| format!("{path}: expected an object, got {v}"))?;
            let mut out = Map::new();
            for sub in field.fields {
                let sub_path = format!("{path}.{}", sub.name);
                let checked = check_value(sub, obj.get(sub.name).unwrap_or(&Value::Null), &sub_path)?;
                out.insert(sub.name.to_string(), checked);
            }
            Ok(Value::Object(out))
        }
    }
}

fn check_integer(v: &Value) -> Result<i64, String> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("{n} is not a 64-bit integer")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("`{s}` is not an integer")),
        other => Err(format!("expected an integer, got {other}")),
    }
}

/// Accepts `[+-]digits[.digits]` within NUMERIC precision. The text is kept as-is.
fn check_numeric(v: &Value) -> Result<String, String> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => return Err(format!("expected a decimal, got {other}")),
    };

    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(&text);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    let digits_ok = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !digits_ok(int_part) || !digits_ok(frac_part)
    {
        return Err(format!("`{text}` is not a decimal"));
    }
    if int_part.trim_start_matches('0').len() > NUMERIC_MAX_INT_DIGITS {
        return Err(format!("`{text}` exceeds NUMERIC precision"));
    }
    if frac_part.len() > NUMERIC_MAX_SCALE {
        return Err(format!("`{text}` exceeds NUMERIC scale"));
    }
    Ok(text)
}

/// RFC 3339 (any offset) or a naive `YYYY-MM-DD[T ]HH:MM:SS` taken as UTC.
pub fn normalize_timestamp(s: &str) -> Result<String, String> {
    parse_timestamp(s).map(|ts| ts.format(STORED_TS_FORMAT).to_string())
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("`{s}` is not a timestamp"))
}

/// Turn a stored column back into JSON.
pub fn decode_column(field: &FieldSchema, v: SqlValue) -> Result<Value, String> {
    match v {
        SqlValue::Null if field.mode == FieldMode::Repeated => Ok(Value::Array(Vec::new())),
        SqlValue::Null => Ok(Value::Null),
        SqlValue::Integer(i) => Ok(Value::from(i)),
        SqlValue::Text(s) if field.mode == FieldMode::Repeated || field.kind == FieldKind::Record => {
            serde_json::from_str(&s).map_err(|e| format!("{}: stored JSON is corrupt: {e}", field.name))
        }
        SqlValue::Text(s) => Ok(Value::String(s)),
        SqlValue::Real(f) => Ok(Value::from(f)),
        SqlValue::Blob(_) => Err(format!("{}: unexpected blob", field.name)),
    }
}
