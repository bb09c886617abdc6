//! Parameter contracts for tools.
//!
//! A tool's parameters are a struct deriving `Deserialize` and `JsonSchema`;
//! the schemars attributes on it are the validation rules. The generated
//! schema is what the LLM sees, and [`parse_params`] enforces that same schema
//! on the raw arguments before deserializing them.

use schemars::gen::{SchemaGenerator, SchemaSettings};
use schemars::schema::{InstanceType, Schema, SchemaObject, StringValidation};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {constraint}")]
pub struct ValidationError {
    pub field: String,
    pub constraint: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

/// A string that must contain something besides whitespace. Used for array
/// items, where field-level `length` attributes don't reach.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl JsonSchema for NonEmptyString {
    fn schema_name() -> String {
        "NonEmptyString".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            string: Some(Box::new(StringValidation {
                min_length: Some(1),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

/// Flat JSON Schema for `T`, with subschemas inlined and no `$schema`/`title`
/// noise, ready to be sent as function-calling parameters.
pub fn schema_for<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.option_nullable = false;
            s.option_add_null_type = false;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<T>();

    let mut schema = serde_json::to_value(root).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = schema.as_object_mut() {
        for key in ["$schema", "title", "description", "definitions"] {
            obj.remove(key);
        }
        obj.entry("properties").or_insert_with(|| json!({}));
    }
    schema
}

/// Validate `raw` against `schema`, then deserialize it into `T`.
///
/// `null` (or a missing argument object) counts as `{}`, and `null` property
/// values count as absent. Properties not in the schema are ignored.
pub fn parse_params<T: DeserializeOwned>(schema: &Value, raw: &Value) -> Result<T, ValidationError> {
    let mut args = match raw {
        Value::Null => Value::Object(Map::new()),
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        _ => return Err(ValidationError::new("arguments", "must be an object")),
    };

    validate(schema, &args)?;
    normalize_integers(schema, &mut args);
    serde_json::from_value(args).map_err(|e| ValidationError::new("arguments", e.to_string()))
}

pub fn validate(schema: &Value, value: &Value) -> Result<(), ValidationError> {
    validate_at(schema, value, "arguments")
}

fn validate_at(schema: &Value, value: &Value, field: &str) -> Result<(), ValidationError> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        check_type(expected, value, field)?;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let names: Vec<String> = allowed
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect();
            return Err(ValidationError::new(
                field,
                format!("must be one of: {}", names.join(", ")),
            ));
        }
    }

    match value {
        Value::Object(map) => {
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if map.get(key).map_or(true, Value::is_null) {
                        return Err(ValidationError::new(child(field, key), "is required"));
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, prop_schema) in properties {
                    match map.get(key) {
                        Some(v) if !v.is_null() => validate_at(prop_schema, v, &child(field, key))?,
                        _ => {}
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
                if (items.len() as u64) < min {
                    let constraint = if min == 1 {
                        "must contain at least one item".to_string()
                    } else {
                        format!("must contain at least {} items", min)
                    };
                    return Err(ValidationError::new(field, constraint));
                }
            }
            if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
                if items.len() as u64 > max {
                    return Err(ValidationError::new(
                        field,
                        format!("must contain at most {} items", max),
                    ));
                }
            }
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_at(item_schema, item, &format!("{}[{}]", field, i))?;
                }
            }
        }
        Value::String(s) => {
            let len = s.trim().chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    let constraint = if min == 1 {
                        "must not be empty".to_string()
                    } else {
                        format!("must be at least {} characters", min)
                    };
                    return Err(ValidationError::new(field, constraint));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if s.chars().count() as u64 > max {
                    return Err(ValidationError::new(
                        field,
                        format!("must be at most {} characters", max),
                    ));
                }
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or_default();
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if n < min {
                    return Err(ValidationError::new(
                        field,
                        format!("must be at least {}", format_number(min)),
                    ));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if n > max {
                    return Err(ValidationError::new(
                        field,
                        format!("must be at most {}", format_number(max)),
                    ));
                }
            }
        }
        _ => {}
    }

    Ok(())
}

fn check_type(expected: &Value, value: &Value, field: &str) -> Result<(), ValidationError> {
    let names: Vec<&str> = match expected {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };

    if names.iter().any(|name| type_matches(name, value)) {
        return Ok(());
    }

    let article = match names.first() {
        Some(name) if name.starts_with(['a', 'e', 'i', 'o', 'u']) => "an",
        _ => "a",
    };
    Err(ValidationError::new(
        field,
        format!("must be {} {}", article, names.join(" or ")),
    ))
}

fn type_matches(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => is_integer(value),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64() || whole_float(value).is_some()
}

/// Integers sent as `5.0` are accepted; serde wants them as `5`.
fn whole_float(value: &Value) -> Option<i64> {
    value
        .as_f64()
        .filter(|f| value.is_f64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

fn expects_integer(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(name)) => name == "integer",
        Some(Value::Array(names)) => names.iter().any(|n| n == "integer"),
        _ => false,
    }
}

fn normalize_integers(schema: &Value, value: &mut Value) {
    match value {
        Value::Number(_) => {
            if expects_integer(schema) {
                if let Some(whole) = whole_float(value) {
                    *value = Value::from(whole);
                }
            }
        }
        Value::Object(map) => {
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, prop_schema) in properties {
                    if let Some(v) = map.get_mut(key) {
                        normalize_integers(prop_schema, v);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for item in items {
                    normalize_integers(item_schema, item);
                }
            }
        }
        _ => {}
    }
}

fn child(parent: &str, key: &str) -> String {
    if parent == "arguments" {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct Example {
        #[schemars(length(min = 1))]
        playlist_id: String,
        #[schemars(length(min = 1, max = 3))]
        uris: Vec<NonEmptyString>,
        #[schemars(range(min = 0, max = 1000))]
        position: Option<u32>,
        #[serde(default = "default_limit")]
        #[schemars(range(min = 1, max = 50))]
        limit: u32,
    }

    fn default_limit() -> u32 {
        10
    }

    fn parse(raw: Value) -> Result<Example, ValidationError> {
        parse_params(&schema_for::<Example>(), &raw)
    }

    #[test]
    fn test_schema_shape() {
        let schema = schema_for::<Example>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("title").is_none());
        assert_eq!(schema["properties"]["playlistId"]["minLength"], 1);
        assert_eq!(schema["properties"]["uris"]["maxItems"], 3);
        assert_eq!(schema["properties"]["uris"]["items"]["minLength"], 1);
        assert_eq!(schema["properties"]["limit"]["default"], 10);

        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"playlistId"));
        assert!(!required.contains(&"position"));
        assert!(!required.contains(&"limit"));
    }

    #[test]
    fn test_valid_input_with_defaults() {
        let parsed = parse(json!({"playlistId": "abc", "uris": ["x"], "position": null, "extra": 1})).unwrap();
        assert_eq!(parsed.playlist_id, "abc");
        assert_eq!(parsed.position, None);
        assert_eq!(parsed.limit, 10);
    }

    #[test]
    fn test_constraint_violations_name_the_field() {
        let cases = [
            (json!({"uris": ["x"]}), "playlistId", "is required"),
            (json!({"playlistId": "", "uris": ["x"]}), "playlistId", "must not be empty"),
            (json!({"playlistId": "  ", "uris": ["x"]}), "playlistId", "must not be empty"),
            (json!({"playlistId": "a", "uris": []}), "uris", "must contain at least one item"),
            (json!({"playlistId": "a", "uris": ["1", "2", "3", "4"]}), "uris", "must contain at most 3 items"),
            (json!({"playlistId": "a", "uris": ["x", ""]}), "uris[1]", "must not be empty"),
            (json!({"playlistId": "a", "uris": ["x"], "position": 1001}), "position", "must be at most 1000"),
            (json!({"playlistId": "a", "uris": ["x"], "limit": 0}), "limit", "must be at least 1"),
            (json!({"playlistId": "a", "uris": ["x"], "limit": 2.5}), "limit", "must be an integer"),
            (json!({"playlistId": 5, "uris": ["x"]}), "playlistId", "must be a string"),
        ];
        for (raw, field, constraint) in cases {
            let err = parse(raw.clone()).unwrap_err();
            assert_eq!(err, ValidationError::new(field, constraint), "input {}", raw);
        }
    }

    #[test]
    fn test_whole_floats_count_as_integers() {
        let parsed = parse(json!({"playlistId": "a", "uris": ["x"], "position": 0.0, "limit": 5.0})).unwrap();
        assert_eq!(parsed.position, Some(0));
        assert_eq!(parsed.limit, 5);

        let err = parse(json!({"playlistId": "a", "uris": ["x"], "limit": 60.0})).unwrap_err();
        assert_eq!(err, ValidationError::new("limit", "must be at most 50"));
    }

    #[test]
    fn test_non_object_arguments() {
        let err = parse(json!(["abc"])).unwrap_err();
        assert_eq!(err.field, "arguments");
    }

    #[test]
    fn test_enum_and_item_checks() {
        let schema = json!({
            "type": "object",
            "properties": {
                "types": {"type": "array", "items": {"type": "string", "enum": ["track", "album"]}}
            }
        });
        assert!(validate(&schema, &json!({"types": ["track"]})).is_ok());
        let err = validate(&schema, &json!({"types": ["track", "podcast"]})).unwrap_err();
        assert_eq!(err.field, "types[1]");
        assert_eq!(err.constraint, "must be one of: track, album");
    }
}
