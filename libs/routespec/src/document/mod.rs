//! API document assembly.
//!
//! The primary document is derived from the frozen registry alone. Additional
//! documents listed in [`DocumentOptions::additional_json_urls`] are fetched
//! concurrently and merged in; a document that cannot be fetched is skipped,
//! and a merge conflict falls back to the primary document.

pub mod components;
pub mod fetch;
pub mod merge;
pub mod model;
pub mod options;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{json, Map, Value};

use crate::api::problem::{reason_phrase, ErrorBody};
use crate::error::DocumentError;
use crate::registry::{FrozenRegistry, RouteSchema};
use components::{downgrade_nullable, ComponentsRegistry};
use fetch::{DocumentFetcher, HttpFetcher, NoFetch};
use merge::merge_documents;
use model::{Components, Info, OpenApi, Tag};
use options::{DocumentOptions, OpenApiVersion};

const JSON: &str = "application/json";
const DEFAULT_TITLE: &str = "API";

pub struct DocumentAssembler {
    fetcher: Arc<dyn DocumentFetcher>,
}

impl DocumentAssembler {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self { fetcher }
    }

    /// Assembler fetching additional documents over HTTP.
    pub fn http(options: &DocumentOptions) -> Result<Self, DocumentError> {
        let fetcher = HttpFetcher::new(Duration::from_secs(options.fetch_timeout_secs))?;
        Ok(Self::new(Arc::new(fetcher)))
    }

    /// Assembler that never fetches; every additional document is skipped.
    pub fn offline() -> Self {
        Self::new(Arc::new(NoFetch))
    }

    pub async fn generate(
        &self,
        registry: &FrozenRegistry,
        options: &DocumentOptions,
    ) -> Result<Value, DocumentError> {
        let primary = build_primary(registry.all(), options)?;
        tracing::info!(
            routes = registry.len(),
            additional = options.additional_json_urls.len(),
            "Generating API document"
        );
        if options.additional_json_urls.is_empty() {
            return Ok(primary);
        }

        let timeout = Duration::from_secs(options.fetch_timeout_secs);
        let fetches = options.additional_json_urls.iter().map(|url| async move {
            let outcome = tokio::time::timeout(timeout, self.fetcher.fetch(url)).await;
            (url, outcome)
        });

        let mut additional = Vec::new();
        for (url, outcome) in join_all(fetches).await {
            match outcome {
                Ok(Ok(doc)) => additional.push(doc),
                Ok(Err(err)) => {
                    tracing::warn!(%url, error = format!("{err:#}"), "Skipping additional API document")
                }
                Err(_) => tracing::warn!(
                    %url,
                    timeout_secs = options.fetch_timeout_secs,
                    "Timed out fetching additional API document"
                ),
            }
        }
        if additional.is_empty() {
            return Ok(primary);
        }

        match merge_documents(&primary, &additional) {
            Ok(merged) => {
                tracing::debug!(merged = additional.len(), "Merged additional API documents");
                Ok(merged)
            }
            Err(conflict) => {
                tracing::warn!(%conflict, "API document merge failed, serving the primary document");
                Ok(primary)
            }
        }
    }
}

/// Builds the document for `routes` without any merging.
pub fn build_primary(
    routes: &[Arc<RouteSchema>],
    options: &DocumentOptions,
) -> Result<Value, DocumentError> {
    let mut components = ComponentsRegistry::default();
    let error_ref = components.schema_ref(serde_json::to_value(schemars::schema_for!(ErrorBody))?);

    let mut paths = Map::new();
    let mut tags: Vec<String> = Vec::new();
    for route in routes {
        let tag = derive_tag(&route.path);
        if !tags.contains(&tag) {
            tags.push(tag.clone());
        }
        let operation = build_operation(route, &tag, &mut components, &error_ref);
        let item = paths
            .entry(document_path(&route.path))
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(item) = item.as_object_mut() {
            item.insert(route.method.as_lower(), operation);
        }
    }

    let doc = OpenApi {
        openapi: options.openapi.as_str(),
        info: Info {
            title: options
                .title
                .clone()
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            version: options.version.clone(),
            description: options.description.clone(),
            terms_of_service: options.terms_of_service.clone(),
            contact: options.contact.clone(),
            license: options.license.clone(),
        },
        servers: options.servers.clone(),
        tags: tags.into_iter().map(|name| Tag { name }).collect(),
        paths,
        components: Components {
            schemas: components.into_map(),
        },
    };

    let mut value = serde_json::to_value(doc)?;
    if options.openapi == OpenApiVersion::V3_0 {
        downgrade_nullable(&mut value);
    }
    Ok(value)
}

fn build_operation(
    route: &RouteSchema,
    tag: &str,
    components: &mut ComponentsRegistry,
    error_ref: &Value,
) -> Value {
    let mut op = Map::new();
    op.insert("operationId".into(), json!(route.operation_id));
    if let Some(summary) = route.summary.as_ref().or(route.title.as_ref()) {
        op.insert("summary".into(), json!(summary));
    }
    if let Some(description) = &route.description {
        op.insert("description".into(), json!(description));
    }
    op.insert("tags".into(), json!([tag]));

    let mut parameters: Vec<Value> = path_parameters(route)
        .into_iter()
        .map(|name| {
            json!({
                "name": name,
                "in": "path",
                "required": true,
                "schema": { "type": "string" }
            })
        })
        .collect();
    if let Some(query) = &route.query_schema {
        parameters.extend(query_parameters(components.normalize(query.describe())));
    }
    if !parameters.is_empty() {
        op.insert("parameters".into(), Value::Array(parameters));
    }

    if route.method.carries_body() {
        if let Some(body) = route.body_schema.as_ref().filter(|s| !s.is_null()) {
            op.insert(
                "requestBody".into(),
                json!({
                    "required": true,
                    "content": { JSON: { "schema": components.schema_ref(body.describe()) } }
                }),
            );
        }
    }

    let mut responses: BTreeMap<u16, Value> = BTreeMap::new();
    for (status, schema) in route.responses.iter() {
        let mut response = Map::new();
        response.insert("description".into(), json!(reason_phrase(status)));
        if !schema.is_null() {
            response.insert(
                "content".into(),
                json!({ JSON: { "schema": components.schema_ref(schema.describe()) } }),
            );
        }
        responses.insert(status, Value::Object(response));
    }
    if responses.is_empty() {
        responses.insert(200, json!({ "description": reason_phrase(200) }));
    }
    let mut error_statuses = vec![500];
    if route.validates_input() {
        error_statuses.insert(0, 400);
    }
    for status in error_statuses {
        responses.entry(status).or_insert_with(|| {
            json!({
                "description": reason_phrase(status),
                "content": { JSON: { "schema": error_ref } }
            })
        });
    }
    op.insert(
        "responses".into(),
        Value::Object(
            responses
                .into_iter()
                .map(|(status, response)| (status.to_string(), response))
                .collect(),
        ),
    );

    Value::Object(op)
}

/// Placeholder names in template order; a catch-all route always gets `path`.
fn path_parameters(route: &RouteSchema) -> Vec<String> {
    let mut names: Vec<String> = route
        .path
        .split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| name.trim_start_matches('*').to_string())
        .collect();
    if route.is_catch_all && !names.iter().any(|n| n == "path") {
        names.push("path".to_string());
    }
    names
}

fn query_parameters(schema: Value) -> Vec<Value> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| {
                    let mut param = json!({
                        "name": name,
                        "in": "query",
                        "required": required.contains(&name.as_str()),
                        "schema": prop
                    });
                    if let Some(description) = prop.get("description") {
                        param["description"] = description.clone();
                    }
                    param
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `{*path}` is written as `{path}` in document path keys.
pub fn document_path(template: &str) -> String {
    template.replace("{*", "{")
}

fn is_version_token(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Groups a route under its first meaningful path segment.
pub fn derive_tag(template: &str) -> String {
    template
        .split('/')
        .find(|segment| {
            !segment.is_empty()
                && !segment.starts_with('{')
                && *segment != "api"
                && !is_version_token(segment)
        })
        .unwrap_or("root")
        .to_string()
}
