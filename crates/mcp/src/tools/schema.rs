// JSON schema helpers for tool input schemas, plus argument validation

use serde_json::{Map, Value};
use toolhost_core::{ToolhostError, ToolhostResult};

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_number(description: &str) -> Value {
    serde_json::json!({
        "type": "number",
        "description": description
    })
}

pub fn json_schema_integer(description: &str) -> Value {
    serde_json::json!({
        "type": "integer",
        "description": description
    })
}

pub fn json_schema_boolean(description: &str) -> Value {
    serde_json::json!({
        "type": "boolean",
        "description": description
    })
}

pub fn json_schema_array(items: Value, description: &str) -> Value {
    serde_json::json!({
        "type": "array",
        "items": items,
        "description": description
    })
}

/// Check `arguments` against an object schema.
///
/// Only the top level is checked: the arguments must be an object (`null` is
/// read as `{}`), every name in `required` must be present and non-null, and
/// every present property declared in `properties` must match its `type`
/// (a string or a list of strings) and `enum`, when given. Properties not
/// declared are accepted unless `additionalProperties` is `false`.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> ToolhostResult<()> {
    let empty = Map::new();
    let args = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(ToolhostError::Argument(format!(
                "arguments must be an object, got {}",
                type_name(other)
            )))
        }
    };

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    for name in required {
        if args.get(name).map_or(true, Value::is_null) {
            return Err(ToolhostError::Argument(format!(
                "missing required field '{}'",
                name
            )));
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in args {
        match properties.and_then(|props| props.get(name)) {
            Some(property) => check_property(name, property, value)?,
            None if closed => {
                return Err(ToolhostError::Argument(format!("unexpected field '{}'", name)))
            }
            None => {}
        }
    }

    Ok(())
}

fn check_property(name: &str, property: &Value, value: &Value) -> ToolhostResult<()> {
    let expected: Vec<&str> = match property.get("type") {
        Some(Value::String(ty)) => vec![ty.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    if !expected.is_empty() && !expected.iter().any(|ty| matches_type(ty, value)) {
        return Err(ToolhostError::Argument(format!(
            "field '{}' must be {}, got {}",
            name,
            expected.join(" or "),
            type_name(value)
        )));
    }

    if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(ToolhostError::Argument(format!(
                "field '{}' must be one of {}",
                name,
                Value::Array(allowed.clone())
            )));
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type keywords are not enforced
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
