//! Coercion of loosely typed patch values into the types items store.

use serde_json::{Map, Value};

use crate::error::{InventoryError, Result};

const ORDER: &str = "order";
const DISCOVERY_SUPPRESS: &str = "discoverySuppress";
const STAFF_ONLY: &str = "staffOnly";
const NESTED_WITH_STAFF_ONLY: [&str; 2] = ["notes", "circulationNotes"];

/// `"true"` in any case is true, every other string is false.
fn to_bool(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::Bool(s.trim().eq_ignore_ascii_case("true"))),
        Value::Number(n) => Some(Value::Bool(n.as_i64() == Some(1))),
        _ => None,
    }
}

fn to_integer(value: &Value) -> Result<Option<Value>> {
    let invalid = || {
        InventoryError::validation(ORDER, format!("order must be an integer: {}", value))
    };
    match value {
        Value::Number(n) if n.is_i64() => Ok(None),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => Ok(Some(Value::from(f as i64))),
            _ => Err(invalid()),
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(|i| Some(Value::from(i)))
            .map_err(|_| invalid()),
        Value::Null => Ok(None),
        _ => Err(invalid()),
    }
}

fn normalize_bool(map: &mut Map<String, Value>, key: &str) {
    if let Some(coerced) = map.get(key).and_then(to_bool) {
        map.insert(key.to_string(), coerced);
    }
}

/// Coerce `order`, `discoverySuppress`, and `staffOnly` inside note lists.
pub fn normalize(props: &mut Map<String, Value>) -> Result<()> {
    if let Some(value) = props.get(ORDER) {
        if let Some(coerced) = to_integer(value)? {
            props.insert(ORDER.to_string(), coerced);
        }
    }

    normalize_bool(props, DISCOVERY_SUPPRESS);

    for list in NESTED_WITH_STAFF_ONLY {
        if let Some(Value::Array(entries)) = props.get_mut(list) {
            for entry in entries.iter_mut() {
                if let Value::Object(fields) = entry {
                    normalize_bool(fields, STAFF_ONLY);
                }
            }
        }
    }
    Ok(())
}
