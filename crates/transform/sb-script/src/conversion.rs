//! JSON <-> Rhai type conversion utilities.

use rhai::{Array, Blob, Dynamic, Map};
use serde_json::{Number, Value};

/// Converts a JSON value into a Rhai Dynamic.
///
/// `null` becomes `()`, objects become object maps, and numbers keep their
/// integer or float nature.
pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => number_to_dynamic(n),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => {
            let array: Array = items.iter().map(json_to_dynamic).collect();
            array.into()
        }
        Value::Object(fields) => {
            let mut map = Map::new();
            for (key, field) in fields {
                map.insert(key.as_str().into(), json_to_dynamic(field));
            }
            map.into()
        }
    }
}

fn number_to_dynamic(n: &Number) -> Dynamic {
    if let Some(i) = n.as_i64() {
        return Dynamic::from(i);
    }
    match n.as_f64() {
        Some(f) => Dynamic::from(f),
        None => Dynamic::UNIT,
    }
}

/// Converts a Rhai Dynamic into a JSON value.
///
/// Returns the Rhai type name of the first value that has no JSON form
/// (function pointers, custom types, non-finite floats).
pub fn dynamic_to_json(value: &Dynamic) -> Result<Value, String> {
    let value = value.flatten_clone();

    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Ok(Value::from(i));
    }
    if let Ok(f) = value.as_float() {
        return Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| format!("{f} (non-finite float)"));
    }
    if let Ok(c) = value.as_char() {
        return Ok(Value::String(c.to_string()));
    }
    if value.is_string() {
        return value
            .into_string()
            .map(Value::String)
            .map_err(|t| t.to_string());
    }
    if value.is_array() {
        let items = value.cast::<Array>();
        return items
            .iter()
            .map(dynamic_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    if value.is_blob() {
        let bytes = value.cast::<Blob>();
        return Ok(Value::Array(bytes.into_iter().map(Value::from).collect()));
    }
    if value.is_map() {
        let map = value.cast::<Map>();
        let mut fields = serde_json::Map::with_capacity(map.len());
        for (key, field) in &map {
            fields.insert(key.to_string(), dynamic_to_json(field)?);
        }
        return Ok(Value::Object(fields));
    }

    Err(value.type_name().to_string())
}
