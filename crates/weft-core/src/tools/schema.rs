//! Minimal JSON-schema validation for tool input
//!
//! Supports `type`, `enum`, `const`, `properties`, `required`, `additionalProperties: false`,
//! `items`, string length, array length and numeric bounds. Unknown keywords are ignored.

use serde_json::{Map, Value};

/// Validate `value` against `schema`, returning the first violation
pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    validate_at("$", value, schema)
}

fn validate_at(path: &str, value: &Value, schema: &Value) -> Result<(), String> {
    let schema = match schema {
        Value::Object(map) => map,
        Value::Bool(true) | Value::Null => return Ok(()),
        Value::Bool(false) => return Err(format!("{}: no value is allowed", path)),
        _ => return Err(format!("{}: schema must be an object", path)),
    };

    if let Some(expected) = schema.get("type") {
        check_type(path, value, expected)?;
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            return Err(format!("{}: value {} is not one of the allowed values", path, value));
        }
    }

    if let Some(constant) = schema.get("const") {
        if constant != value {
            return Err(format!("{}: expected constant {}", path, constant));
        }
    }

    match value {
        Value::Object(object) => validate_object(path, object, schema)?,
        Value::Array(items) => validate_array(path, items, schema)?,
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    return Err(format!("{}: string shorter than {}", path, min));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if len > max {
                    return Err(format!("{}: string longer than {}", path, max));
                }
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if n < min {
                    return Err(format!("{}: {} is below minimum {}", path, n, min));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if n > max {
                    return Err(format!("{}: {} is above maximum {}", path, n, max));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_object(path: &str, object: &Map<String, Value>, schema: &Map<String, Value>) -> Result<(), String> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(format!("{}: missing required property '{}'", path, key));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    for (key, child) in object {
        match properties.and_then(|p| p.get(key)) {
            Some(child_schema) => validate_at(&format!("{}.{}", path, key), child, child_schema)?,
            None => match schema.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    return Err(format!("{}: unexpected property '{}'", path, key));
                }
                Some(extra @ Value::Object(_)) => {
                    validate_at(&format!("{}.{}", path, key), child, extra)?
                }
                _ => {}
            },
        }
    }
    Ok(())
}

fn validate_array(path: &str, items: &[Value], schema: &Map<String, Value>) -> Result<(), String> {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min {
            return Err(format!("{}: fewer than {} items", path, min));
        }
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if (items.len() as u64) > max {
            return Err(format!("{}: more than {} items", path, max));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            validate_at(&format!("{}[{}]", path, i), item, item_schema)?;
        }
    }
    Ok(())
}

fn check_type(path: &str, value: &Value, expected: &Value) -> Result<(), String> {
    let matches = match expected {
        Value::String(t) => type_matches(value, t),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| type_matches(value, t)),
        _ => true,
    };
    if matches {
        Ok(())
    } else {
        Err(format!("{}: expected type {}, got {}", path, expected, type_name(value)))
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "minLength": 1},
                "times": {"type": "integer", "minimum": 1, "maximum": 3},
                "mode": {"enum": ["plain", "loud"]}
            },
            "required": ["text"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_input() {
        assert!(validate(&json!({"text": "hi", "times": 2, "mode": "loud"}), &echo_schema()).is_ok());
    }

    #[test]
    fn test_violations() {
        let schema = echo_schema();
        let missing = validate(&json!({}), &schema).unwrap_err();
        assert!(missing.contains("missing required property 'text'"));

        assert!(validate(&json!({"text": 5}), &schema).unwrap_err().contains("$.text"));
        assert!(validate(&json!({"text": "hi", "times": 4}), &schema).is_err());
        assert!(validate(&json!({"text": "hi", "times": 1.5}), &schema).is_err());
        assert!(validate(&json!({"text": "hi", "mode": "quiet"}), &schema).is_err());
        assert!(validate(&json!({"text": "hi", "extra": true}), &schema).is_err());
        assert!(validate(&json!("hi"), &schema).is_err());
    }

    #[test]
    fn test_arrays_and_union_types() {
        let schema = json!({
            "type": "array",
            "items": {"type": ["string", "null"]},
            "maxItems": 2
        });
        assert!(validate(&json!(["a", null]), &schema).is_ok());
        assert!(validate(&json!(["a", 1]), &schema).unwrap_err().contains("$[1]"));
        assert!(validate(&json!(["a", "b", "c"]), &schema).is_err());
    }

    #[test]
    fn test_empty_schema_accepts_anything() {
        assert!(validate(&json!({"anything": [1, 2]}), &json!({})).is_ok());
        assert!(validate(&json!(1), &Value::Null).is_ok());
    }
}
