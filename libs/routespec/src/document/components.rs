use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

const DEFINITIONS_REF: &str = "#/definitions/";
const COMPONENTS_REF: &str = "#/components/schemas/";

/// Named schemas collected while assembling a document.
#[derive(Debug, Default, Clone)]
pub struct ComponentsRegistry {
    /// Schema name -> normalized schema (serialized to components.schemas)
    pub schemas: BTreeMap<String, Value>,
}

impl ComponentsRegistry {
    /// Recursively rewrite all "$ref" values from "#/definitions/*" to
    /// "#/components/schemas/*".
    fn rewrite_refs_to_oas3(value: &mut Value) {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(s)) = map.get_mut("$ref") {
                    if let Some(rest) = s.strip_prefix(DEFINITIONS_REF) {
                        *s = format!("{COMPONENTS_REF}{rest}");
                    }
                }
                for v in map.values_mut() {
                    Self::rewrite_refs_to_oas3(v);
                }
            }
            Value::Array(arr) => {
                for v in arr {
                    Self::rewrite_refs_to_oas3(v);
                }
            }
            _ => {}
        }
    }

    /// Hoists embedded `definitions` into the registry, rewrites `$ref`s
    /// and drops the `$schema` marker. Returns what is left of the root.
    pub fn normalize(&mut self, mut schema: Value) -> Value {
        Self::rewrite_refs_to_oas3(&mut schema);
        if let Value::Object(map) = &mut schema {
            map.remove("$schema");
            if let Some(Value::Object(definitions)) = map.remove("definitions") {
                tracing::debug!(count = definitions.len(), "Hoisting embedded definitions");
                for (name, definition) in definitions {
                    self.register_schema(name, definition);
                }
            }
        }
        schema
    }

    /// Normalizes `schema`; a titled schema is registered under its title
    /// and replaced by a `$ref`.
    pub fn schema_ref(&mut self, schema: Value) -> Value {
        let normalized = self.normalize(schema);
        let title = normalized
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        match title {
            Some(name) => {
                self.register_schema(name.clone(), normalized);
                json!({ "$ref": format!("{COMPONENTS_REF}{name}") })
            }
            None => normalized,
        }
    }

    /// Registers a schema component. The first registration of a name wins.
    /// Returns true when inserted.
    pub fn register_schema(&mut self, name: impl Into<String>, schema: Value) -> bool {
        let name = name.into();
        if let Some(existing) = self.schemas.get(&name) {
            if *existing == schema {
                tracing::debug!(schema_name = %name, "Identical schema re-registered, ignoring");
            } else {
                tracing::warn!(
                    schema_name = %name,
                    "Schema conflict: keeping the first registered schema"
                );
            }
            return false;
        }
        self.schemas.insert(name, schema);
        true
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.schemas.into_iter().collect()
    }
}

/// Rewrites JSON Schema nullability into the OpenAPI 3.0 `nullable` flag.
pub fn downgrade_nullable(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let types = map.get("type").and_then(Value::as_array).map(|types| {
                let non_null: Vec<Value> = types
                    .iter()
                    .filter(|t| t.as_str() != Some("null"))
                    .cloned()
                    .collect();
                (non_null.len() < types.len(), non_null)
            });
            if let Some((true, mut non_null)) = types {
                map.insert("nullable".into(), Value::Bool(true));
                match non_null.len() {
                    0 => {
                        map.remove("type");
                    }
                    1 => {
                        map.insert("type".into(), non_null.remove(0));
                    }
                    _ => {
                        map.insert("type".into(), Value::Array(non_null));
                    }
                }
            }

            let null_variant = |v: &Value| v.get("type").and_then(Value::as_str) == Some("null");
            let variants = map
                .get("anyOf")
                .and_then(Value::as_array)
                .filter(|variants| variants.iter().any(null_variant))
                .map(|variants| {
                    variants
                        .iter()
                        .filter(|v| !null_variant(*v))
                        .cloned()
                        .collect::<Vec<_>>()
                });
            if let Some(rest) = variants {
                map.remove("anyOf");
                map.insert("nullable".into(), Value::Bool(true));
                if rest.len() == 1 {
                    map.insert("allOf".into(), Value::Array(rest));
                } else {
                    map.insert("anyOf".into(), Value::Array(rest));
                }
            }

            for v in map.values_mut() {
                downgrade_nullable(v);
            }
        }
        Value::Array(items) => {
            for v in items {
                downgrade_nullable(v);
            }
        }
        _ => {}
    }
}
