//! Conversion between plain JSON documents and Firestore's typed value
//! encoding (`{"stringValue": ...}`, `{"integerValue": "42"}`, ...).
//!
//! Timestamps travel as RFC 3339 strings on the JSON side, so both
//! `stringValue` and `timestampValue` decode to a string and re-encoding a
//! decoded document is lossless for every field the collection uses.

use serde_json::{json, Map, Value};

/// Encode one JSON value into a Firestore typed value.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // Firestore carries 64-bit integers as decimal strings.
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

/// Decode one Firestore typed value back into plain JSON. Unknown value
/// kinds decode to null rather than failing the whole document.
pub(crate) fn decode_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };
    if let Some(s) = obj.get("stringValue").and_then(Value::as_str) {
        return Value::String(s.to_string());
    }
    if let Some(s) = obj.get("timestampValue").and_then(Value::as_str) {
        return Value::String(s.to_string());
    }
    if let Some(raw) = obj.get("integerValue").and_then(Value::as_str) {
        return match raw.parse::<i64>() {
            Ok(i) => json!(i),
            Err(_) => Value::Null,
        };
    }
    if let Some(f) = obj.get("doubleValue").and_then(Value::as_f64) {
        return json!(f);
    }
    if let Some(b) = obj.get("booleanValue").and_then(Value::as_bool) {
        return Value::Bool(b);
    }
    if let Some(items) = obj
        .get("arrayValue")
        .and_then(|a| a.get("values"))
        .and_then(Value::as_array)
    {
        return Value::Array(items.iter().map(decode_value).collect());
    }
    if let Some(fields) = obj
        .get("mapValue")
        .and_then(|m| m.get("fields"))
        .and_then(Value::as_object)
    {
        return Value::Object(decode_fields(fields));
    }
    Value::Null
}

pub(crate) fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

pub(crate) fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}
