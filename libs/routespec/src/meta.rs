//! Route declaration.
//!
//! A route module calls [`define_meta`] once with a [`RouteMeta`] literal.
//! The build step fills in `__path` and `__method` from the file location, so
//! route authors never write them by hand:
//!
//! ```ignore
//! pub fn route(registry: &mut Registry) -> anyhow::Result<Pipeline> {
//!     let def = define_meta(registry, RouteMeta {
//!         response: ResponseSchemas::single(schema::<Page>()?),
//!         ..RouteMeta::default()
//!     })?;
//!     Ok(def.define_event_handler(handler_fn(show)))
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use routespec_build::HttpMethod;

use crate::error::DeclarationError;
use crate::pipeline::cache::CacheOptions;
use crate::pipeline::handler::HandlerRef;
use crate::pipeline::middleware::MiddlewareRef;
use crate::pipeline::transform::ResponseTransform;
use crate::pipeline::Pipeline;
use crate::registry::{Registry, ResolvedResponses, RouteSchema};
use crate::schema::SchemaRef;

/// Response validators as declared by a route. Defaults to no schemas, so a
/// route that never declares one may only answer without a body.
#[derive(Clone)]
pub enum ResponseSchemas {
    /// Used for status 200 and as the fallback for every other status.
    Single(SchemaRef),
    ByStatusCode(BTreeMap<u16, SchemaRef>),
}

impl ResponseSchemas {
    pub fn single(schema: SchemaRef) -> Self {
        Self::Single(schema)
    }

    pub fn by_status<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u16, SchemaRef)>,
    {
        Self::ByStatusCode(entries.into_iter().collect())
    }

    fn into_map(self) -> BTreeMap<u16, SchemaRef> {
        match self {
            Self::Single(schema) => BTreeMap::from([(200, schema)]),
            Self::ByStatusCode(map) => map,
        }
    }
}

impl Default for ResponseSchemas {
    fn default() -> Self {
        Self::ByStatusCode(BTreeMap::new())
    }
}

#[derive(Clone, Default)]
pub struct RouteMeta {
    /// Defaults to the URL template.
    pub operation_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    /// Path parameter schema.
    pub path: Option<SchemaRef>,
    pub query: Option<SchemaRef>,
    pub body: Option<SchemaRef>,
    pub response: ResponseSchemas,
    /// Per-status entries layered over `response`.
    pub responses: BTreeMap<u16, SchemaRef>,
    pub middleware: Vec<MiddlewareRef>,
    pub transform_response: Option<ResponseTransform>,
    pub __path: &'static str,
    pub __method: &'static str,
}

impl fmt::Debug for RouteMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMeta")
            .field("operation_id", &self.operation_id)
            .field("__path", &self.__path)
            .field("__method", &self.__method)
            .finish_non_exhaustive()
    }
}

/// Registers the route described by `meta`.
pub fn define_meta(
    registry: &mut Registry,
    meta: RouteMeta,
) -> Result<RouteDefinition, DeclarationError> {
    if meta.__path.is_empty() || meta.__method.is_empty() {
        return Err(DeclarationError::NotAnnotated);
    }
    let method: HttpMethod = meta.__method.parse()?;

    let mut responses = meta.response.into_map();
    responses.extend(meta.responses);

    let mut schema = RouteSchema::new(method, meta.__path);
    if let Some(operation_id) = meta.operation_id {
        schema.operation_id = operation_id;
    }
    schema.title = meta.title;
    schema.summary = meta.summary;
    schema.description = meta.description;
    schema.query_schema = meta.query;
    schema.path_schema = meta.path;
    schema.body_schema = meta.body;
    schema.responses = ResolvedResponses::new(responses);
    schema.middleware = meta.middleware;
    schema.transform = meta.transform_response;

    let schema = registry.register(schema)?;
    Ok(RouteDefinition { schema })
}

impl Registry {
    /// Method form of [`define_meta`].
    pub fn define_meta(&mut self, meta: RouteMeta) -> Result<RouteDefinition, DeclarationError> {
        define_meta(self, meta)
    }
}

/// A registered route waiting for its handler.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    schema: Arc<RouteSchema>,
}

impl RouteDefinition {
    pub fn schema(&self) -> &Arc<RouteSchema> {
        &self.schema
    }

    pub fn define_event_handler(self, handler: HandlerRef) -> Pipeline {
        Pipeline::new(self.schema, handler)
    }

    /// Like [`define_event_handler`](Self::define_event_handler), but
    /// successful results are reused for identical input until `max_age`.
    pub fn define_cached_event_handler(self, handler: HandlerRef, options: CacheOptions) -> Pipeline {
        Pipeline::new(self.schema, handler).with_cache(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::schema::json_schema;
    use serde_json::json;

    fn annotated(path: &'static str, method: &'static str) -> RouteMeta {
        RouteMeta {
            __path: path,
            __method: method,
            ..RouteMeta::default()
        }
    }

    #[test]
    fn missing_injection_is_reported() {
        let mut registry = Registry::new();
        let err = define_meta(&mut registry, RouteMeta::default()).unwrap_err();
        assert!(matches!(err, DeclarationError::NotAnnotated));
        assert!(registry.is_empty());
    }

    #[test]
    fn invalid_method_is_reported() {
        let mut registry = Registry::new();
        let err = define_meta(&mut registry, annotated("/", "FETCH")).unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidMethod(_)));
    }

    #[test]
    fn operation_id_defaults_to_path() {
        let mut registry = Registry::new();
        let def = define_meta(&mut registry, annotated("/users/{id}", "PATCH")).unwrap();
        assert_eq!(def.schema().operation_id, "/users/{id}");
        assert_eq!(def.schema().method, HttpMethod::Patch);

        let def = registry
            .define_meta(RouteMeta {
                operation_id: Some("listUsers".into()),
                ..annotated("/users", "GET")
            })
            .unwrap();
        assert_eq!(def.schema().operation_id, "listUsers");
    }

    #[test]
    fn undeclared_responses_stay_empty() {
        let mut registry = Registry::new();
        let def = define_meta(&mut registry, annotated("/", "GET")).unwrap();
        let responses = &def.schema().responses;
        assert!(responses.is_empty());
        assert!(responses.for_status(200).is_none());
    }

    #[test]
    fn single_response_maps_to_200() {
        let mut registry = Registry::new();
        let def = define_meta(
            &mut registry,
            RouteMeta {
                response: ResponseSchemas::single(json_schema(json!({ "type": "object" })).unwrap()),
                ..annotated("/", "GET")
            },
        )
        .unwrap();
        let codes: Vec<u16> = def.schema().responses.iter().map(|(s, _)| s).collect();
        assert_eq!(codes, vec![200]);
    }

    #[test]
    fn responses_override_per_status() {
        let ok = json_schema(json!({ "type": "object" })).unwrap();
        let gone = json_schema(json!({ "type": "string" })).unwrap();
        let mut registry = Registry::new();
        let def = define_meta(
            &mut registry,
            RouteMeta {
                response: ResponseSchemas::by_status([(200, ok.clone()), (410, ok)]),
                responses: BTreeMap::from([(410, gone)]),
                ..annotated("/things/{id}", "GET")
            },
        )
        .unwrap();
        let responses = &def.schema().responses;
        let codes: Vec<u16> = responses.iter().map(|(s, _)| s).collect();
        assert_eq!(codes, vec![200, 410]);
        assert_eq!(responses.for_status(410).unwrap().describe()["type"], "string");
    }

    #[test]
    fn duplicate_declarations_surface_the_registry_error() {
        let mut registry = Registry::new();
        define_meta(&mut registry, annotated("/pages/{page}", "GET")).unwrap();
        let err = define_meta(&mut registry, annotated("/pages/{page}", "GET")).unwrap_err();
        assert!(matches!(
            err,
            DeclarationError::Registry(RegistryError::DuplicateRouteRegistration { .. })
        ));
    }
}
