use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

use routespec_build::HttpMethod;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeConflict {
    #[error("operation {method} {path} is defined more than once")]
    DuplicateOperation { path: String, method: String },
    #[error("operationId '{0}' is used more than once")]
    DuplicateOperationId(String),
    #[error("component schema '{0}' differs between documents")]
    SchemaMismatch(String),
}

fn is_operation_key(key: &str) -> bool {
    HttpMethod::ALL.iter().any(|m| m.as_lower() == key)
}

fn operation_ids(doc: &Value) -> impl Iterator<Item = &str> {
    doc.get("paths")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|paths| paths.values())
        .filter_map(Value::as_object)
        .flat_map(|item| {
            item.iter()
                .filter(|(key, _)| is_operation_key(key))
                .filter_map(|(_, op)| op.get("operationId").and_then(Value::as_str))
        })
}

fn object_at<'a>(doc: &'a mut Value, keys: &[&str]) -> Option<&'a mut Map<String, Value>> {
    let mut current = doc;
    for key in keys {
        let map = current.as_object_mut()?;
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    current.as_object_mut()
}

/// Merges `others` into a copy of `primary`. Paths, component schemas and
/// tags are unioned; any structural conflict aborts the whole merge.
pub fn merge_documents(primary: &Value, others: &[Value]) -> Result<Value, MergeConflict> {
    let mut merged = primary.clone();
    let mut seen_ids: HashSet<String> = operation_ids(primary).map(str::to_string).collect();

    for other in others {
        if let Some(paths) = other.get("paths").and_then(Value::as_object) {
            let Some(target) = object_at(&mut merged, &["paths"]) else {
                continue;
            };
            for (path, item) in paths {
                let Some(item) = item.as_object() else {
                    continue;
                };
                let entry = target
                    .entry(path.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                let Some(entry) = entry.as_object_mut() else {
                    continue;
                };
                for (key, value) in item {
                    if !is_operation_key(key) {
                        entry.entry(key.clone()).or_insert_with(|| value.clone());
                        continue;
                    }
                    if entry.contains_key(key) {
                        return Err(MergeConflict::DuplicateOperation {
                            path: path.clone(),
                            method: key.to_uppercase(),
                        });
                    }
                    if let Some(id) = value.get("operationId").and_then(Value::as_str) {
                        if !seen_ids.insert(id.to_string()) {
                            return Err(MergeConflict::DuplicateOperationId(id.to_string()));
                        }
                    }
                    entry.insert(key.clone(), value.clone());
                }
            }
        }

        if let Some(schemas) = other
            .pointer("/components/schemas")
            .and_then(Value::as_object)
        {
            if let Some(target) = object_at(&mut merged, &["components", "schemas"]) {
                for (name, schema) in schemas {
                    match target.get(name) {
                        Some(existing) if existing != schema => {
                            return Err(MergeConflict::SchemaMismatch(name.clone()))
                        }
                        Some(_) => {}
                        None => {
                            target.insert(name.clone(), schema.clone());
                        }
                    }
                }
            }
        }

        if let Some(tags) = other.get("tags").and_then(Value::as_array) {
            let tag_name = |t: &Value| t.get("name").and_then(Value::as_str).map(str::to_string);
            let existing: HashSet<String> = merged
                .get("tags")
                .and_then(Value::as_array)
                .map(|ts| ts.iter().filter_map(tag_name).collect())
                .unwrap_or_default();
            let fresh: Vec<Value> = tags
                .iter()
                .filter(|t| tag_name(*t).is_some_and(|n| !existing.contains(&n)))
                .cloned()
                .collect();
            if !fresh.is_empty() {
                if let Some(obj) = merged.as_object_mut() {
                    let slot = obj
                        .entry("tags")
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Some(list) = slot.as_array_mut() {
                        list.extend(fresh);
                    }
                }
            }
        }
    }
    Ok(merged)
}
