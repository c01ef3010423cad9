//! The small JSON-schema subset the SDK enforces: root object shape for tool
//! schemas, and `type`/`required`/`additionalProperties`/`items` checks for
//! tool arguments and structured output.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AgentError, SchemaError};

pub(crate) fn validate_tool_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    let root_type = schema_obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::RootTypeMustBeObject)?;

    if root_type != "object" {
        return Err(SchemaError::RootTypeMustBeObject);
    }

    if let Some(required) = schema_obj.get("required") {
        let required_arr = required.as_array().ok_or(SchemaError::InvalidRequired)?;
        if required_arr.iter().any(|item| !item.is_string()) {
            return Err(SchemaError::InvalidRequired);
        }
    }

    Ok(())
}

/// Checks `value` against `schema`, returning a human readable reason on the
/// first violation. Keywords outside the supported subset are ignored.
pub fn validate_value(schema: &Value, value: &Value) -> Result<(), String> {
    check(schema, value, "")
}

fn check(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema_obj.get("type") {
        let allowed = type_names(expected);
        if !allowed.is_empty() && !allowed.iter().any(|name| value_matches_type(value, name)) {
            return Err(format!(
                "{} must be of type {}",
                describe(path),
                allowed.join(" or ")
            ));
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(field) {
                    return Err(format!("missing required field: {}", join(path, field)));
                }
            }
        }

        let properties = schema_obj.get("properties").and_then(Value::as_object);

        if schema_obj.get("additionalProperties").and_then(Value::as_bool) == Some(false) {
            for key in object.keys() {
                if !properties.is_some_and(|props| props.contains_key(key)) {
                    return Err(format!("unknown field: {}", join(path, key)));
                }
            }
        }

        if let Some(properties) = properties {
            for (key, field_value) in object {
                if let Some(field_schema) = properties.get(key) {
                    check(field_schema, field_value, &join(path, key))?;
                }
            }
        }
    }

    if let (Some(items), Some(array)) = (schema_obj.get("items"), value.as_array()) {
        for (index, item) in array.iter().enumerate() {
            check(items, item, &format!("{path}[{index}]"))?;
        }
    }

    Ok(())
}

fn type_names(expected: &Value) -> Vec<&str> {
    match expected {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn describe(path: &str) -> String {
    if path.is_empty() {
        "value".to_string()
    } else {
        format!("field '{path}'")
    }
}

/// Parses a model's final text into `T`, enforcing `schema` first.
pub fn parse_structured<T>(schema: &Value, text: &str) -> Result<T, AgentError>
where
    T: DeserializeOwned,
{
    let body = strip_code_fence(text.trim());
    let value: Value = serde_json::from_str(body).map_err(|err| {
        AgentError::SchemaMismatch(format!("final response is not valid JSON: {err}"))
    })?;

    validate_value(schema, &value).map_err(AgentError::SchemaMismatch)?;

    serde_json::from_value(value).map_err(|err| AgentError::SchemaMismatch(err.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    fn city_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": ["string", "null"]},
                "weather": {"type": ["string", "null"]}
            }
        })
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct City {
        name: Option<String>,
        weather: Option<String>,
    }

    #[test]
    fn tool_schema_must_be_object_rooted() {
        assert!(validate_tool_schema(&json!({"type": "string"})).is_err());
        assert!(validate_tool_schema(&json!({"type": "object", "required": [1]})).is_err());
        assert!(validate_tool_schema(&json!({"type": "object"})).is_ok());
    }

    #[test]
    fn nullable_union_types_accept_null() {
        let value = json!({"name": "Chennai", "weather": null});
        assert!(validate_value(&city_schema(), &value).is_ok());
    }

    #[test]
    fn wrong_field_type_is_reported_with_path() {
        let err = validate_value(&city_schema(), &json!({"name": 5})).expect_err("must fail");
        assert_eq!(err, "field 'name' must be of type string or null");
    }

    #[test]
    fn nested_arrays_are_checked() {
        let schema = json!({
            "type": "object",
            "properties": {"tags": {"type": "array", "items": {"type": "string"}}}
        });
        let err = validate_value(&schema, &json!({"tags": ["a", 1]})).expect_err("must fail");
        assert!(err.contains("tags[1]"));
    }

    #[test]
    fn parse_structured_accepts_fenced_json() {
        let city: City = parse_structured(
            &city_schema(),
            "```json\n{\"name\": \"Chennai\", \"weather\": null}\n```",
        )
        .expect("parses");

        assert_eq!(
            city,
            City {
                name: Some("Chennai".to_string()),
                weather: None,
            }
        );
    }

    #[test]
    fn parse_structured_rejects_prose() {
        let err = parse_structured::<City>(&city_schema(), "It is Chennai.").expect_err("fails");
        assert!(matches!(err, AgentError::SchemaMismatch(_)));
    }
}
