//! The schema capability used for request and response validation.
//!
//! A [`Schema`] turns untyped JSON into validated JSON (or a list of field
//! errors) and describes itself as a JSON Schema document for the generated
//! API document. Two implementations cover most routes:
//!
//! - [`TypedSchema<T>`] for Rust types deriving `schemars::JsonSchema`;
//! - [`JsonSchemaValidator`] for hand-written JSON Schema documents.

use std::marker::PhantomData;
use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Number, Value};
use thiserror::Error;

/// One validation failure, located by JSON pointer (`""` is the root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn root(message: impl Into<String>) -> Self {
        Self::new("", message)
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid JSON schema: {0}")]
    Compile(String),
    #[error("failed to render schema: {0}")]
    Render(#[from] serde_json::Error),
}

pub trait Schema: Send + Sync + 'static {
    /// Parses `input`, returning the normalized value or every field error found.
    fn validate(&self, input: &Value) -> Result<Value, Vec<FieldError>>;

    /// JSON Schema document describing accepted values.
    fn describe(&self) -> Value;

    /// True when the only accepted value is "no body".
    fn is_null(&self) -> bool {
        false
    }

    /// Converts string-typed query/path values to the scalar types this schema declares.
    fn coerce_params(&self, raw: Map<String, Value>) -> Value {
        coerce_params(&self.describe(), raw)
    }
}

pub type SchemaRef = Arc<dyn Schema>;

/// Validator for a JSON Schema (draft 7) document.
pub struct JsonSchemaValidator {
    document: Value,
    compiled: JSONSchema,
}

impl JsonSchemaValidator {
    pub fn new(document: Value) -> Result<Self, SchemaError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&document)
            .map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Self { document, compiled })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    fn check(&self, input: &Value) -> Result<(), Vec<FieldError>> {
        self.compiled.validate(input).map_err(|errors| {
            errors
                .map(|e| FieldError::new(e.instance_path.to_string(), e.to_string()))
                .collect()
        })
    }
}

impl Schema for JsonSchemaValidator {
    fn validate(&self, input: &Value) -> Result<Value, Vec<FieldError>> {
        self.check(input)?;
        Ok(input.clone())
    }

    fn describe(&self) -> Value {
        self.document.clone()
    }

    fn coerce_params(&self, raw: Map<String, Value>) -> Value {
        coerce_params(&self.document, raw)
    }
}

/// Schema derived from a Rust type.
///
/// Validation runs the JSON Schema first (so every field error is reported),
/// then deserializes into `T` and serializes back, which applies serde
/// defaults and drops unknown fields.
pub struct TypedSchema<T> {
    validator: JsonSchemaValidator,
    _type: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T>
where
    T: JsonSchema + DeserializeOwned + Serialize + 'static,
{
    pub fn new() -> Result<Self, SchemaError> {
        let root = schemars::schema_for!(T);
        let document = serde_json::to_value(&root)?;
        Ok(Self {
            validator: JsonSchemaValidator::new(document)?,
            _type: PhantomData,
        })
    }
}

impl<T> Schema for TypedSchema<T>
where
    T: JsonSchema + DeserializeOwned + Serialize + 'static,
{
    fn validate(&self, input: &Value) -> Result<Value, Vec<FieldError>> {
        self.validator.check(input)?;
        let typed: T = serde_json::from_value(input.clone())
            .map_err(|e| vec![FieldError::root(e.to_string())])?;
        serde_json::to_value(typed).map_err(|e| vec![FieldError::root(e.to_string())])
    }

    fn describe(&self) -> Value {
        self.validator.document.clone()
    }

    fn coerce_params(&self, raw: Map<String, Value>) -> Value {
        coerce_params(&self.validator.document, raw)
    }
}

/// Accepts only an absent body. Default response schema of a route.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSchema;

impl Schema for NullSchema {
    fn validate(&self, input: &Value) -> Result<Value, Vec<FieldError>> {
        match input {
            Value::Null => Ok(Value::Null),
            _ => Err(vec![FieldError::root("expected no body")]),
        }
    }

    fn describe(&self) -> Value {
        json!({ "type": "null" })
    }

    fn is_null(&self) -> bool {
        true
    }
}

/// Schema for `T`, shared.
pub fn schema<T>() -> Result<SchemaRef, SchemaError>
where
    T: JsonSchema + DeserializeOwned + Serialize + 'static,
{
    Ok(Arc::new(TypedSchema::<T>::new()?))
}

/// Schema from a raw JSON Schema document, shared.
pub fn json_schema(document: Value) -> Result<SchemaRef, SchemaError> {
    Ok(Arc::new(JsonSchemaValidator::new(document)?))
}

pub fn null_schema() -> SchemaRef {
    Arc::new(NullSchema)
}

/// Query strings and path segments always arrive as text; convert each
/// property to the first scalar type its schema lists that parses.
pub fn coerce_params(description: &Value, raw: Map<String, Value>) -> Value {
    let Some(properties) = description.get("properties").and_then(Value::as_object) else {
        return Value::Object(raw);
    };

    let coerced = raw
        .into_iter()
        .map(|(name, value)| {
            let value = match properties.get(&name) {
                Some(prop) => coerce_value(prop, value),
                None => value,
            };
            (name, value)
        })
        .collect();
    Value::Object(coerced)
}

fn coerce_value(prop: &Value, value: Value) -> Value {
    match value {
        Value::String(s) => coerce_scalar(prop, s),
        Value::Array(items) => {
            let item_schema = prop.get("items").unwrap_or(&Value::Null);
            Value::Array(
                items
                    .into_iter()
                    .map(|v| coerce_value(item_schema, v))
                    .collect(),
            )
        }
        other => other,
    }
}

fn coerce_scalar(prop: &Value, s: String) -> Value {
    let declared: Vec<&str> = match prop.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    for ty in declared {
        match ty {
            "string" => return Value::String(s),
            "integer" => {
                if let Ok(n) = s.parse::<i64>() {
                    return Value::Number(n.into());
                }
            }
            "number" => {
                if let Some(n) = s.parse::<f64>().ok().and_then(Number::from_f64) {
                    return Value::Number(n);
                }
            }
            "boolean" => match s.as_str() {
                "true" => return Value::Bool(true),
                "false" => return Value::Bool(false),
                _ => {}
            },
            _ => {}
        }
    }
    Value::String(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct Paging {
        page: u32,
        #[serde(default)]
        verbose: bool,
        tag: Option<String>,
    }

    #[test]
    fn typed_schema_reports_field_errors() {
        let s = TypedSchema::<Paging>::new().unwrap();
        let errors = s.validate(&json!({ "page": "two" })).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/page");
    }

    #[test]
    fn typed_schema_normalizes_through_serde() {
        let s = TypedSchema::<Paging>::new().unwrap();
        let out = s.validate(&json!({ "page": 2, "extra": 1 })).unwrap();
        assert_eq!(out, json!({ "page": 2, "verbose": false, "tag": null }));
    }

    #[test]
    fn describe_carries_the_type_title() {
        let s = TypedSchema::<Paging>::new().unwrap();
        assert_eq!(s.describe()["title"], "Paging");
    }

    #[test]
    fn raw_schema_validates_as_is() {
        let s = JsonSchemaValidator::new(json!({
            "type": "object",
            "required": ["message"],
            "properties": { "message": { "type": "string" } }
        }))
        .unwrap();
        assert!(s.validate(&json!({ "message": "hi" })).is_ok());
        let errors = s.validate(&json!({})).unwrap_err();
        assert_eq!(errors[0].path, "");
    }

    #[test]
    fn broken_schema_does_not_compile() {
        let err = JsonSchemaValidator::new(json!({ "type": 12 })).err().unwrap();
        assert!(matches!(err, SchemaError::Compile(_)));
    }

    #[test]
    fn null_schema_accepts_only_null() {
        assert_eq!(NullSchema.validate(&Value::Null), Ok(Value::Null));
        assert!(NullSchema.validate(&json!({})).is_err());
        assert!(NullSchema.is_null());
    }

    #[test]
    fn params_are_coerced_by_declared_type() {
        let s = TypedSchema::<Paging>::new().unwrap();
        let mut raw = Map::new();
        raw.insert("page".into(), json!("3"));
        raw.insert("verbose".into(), json!("true"));
        raw.insert("tag".into(), json!("42"));
        raw.insert("unknown".into(), json!("x"));

        let coerced = s.coerce_params(raw);
        assert_eq!(
            coerced,
            json!({ "page": 3, "verbose": true, "tag": "42", "unknown": "x" })
        );
    }

    #[test]
    fn unparsable_values_stay_strings() {
        let desc = json!({ "properties": { "n": { "type": "integer" } } });
        let mut raw = Map::new();
        raw.insert("n".into(), json!("abc"));
        assert_eq!(coerce_params(&desc, raw), json!({ "n": "abc" }));
    }
}
