//! Process-wide collection of route schemas.
//!
//! Routes register into a [`Registry`] while the application starts. Once
//! every route is in, [`Registry::freeze`] yields a read-only
//! [`FrozenRegistry`]; nothing can be added after that point. A
//! [`RegistryHandle`] publishes the frozen registry to readers and lets a
//! reload swap in a freshly built one atomically.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use routespec_build::HttpMethod;

use crate::error::RegistryError;
use crate::pipeline::middleware::MiddlewareRef;
use crate::pipeline::transform::ResponseTransform;
use crate::schema::SchemaRef;

/// Response validators keyed by status code.
#[derive(Clone, Default)]
pub struct ResolvedResponses(BTreeMap<u16, SchemaRef>);

impl ResolvedResponses {
    pub fn new(map: BTreeMap<u16, SchemaRef>) -> Self {
        Self(map)
    }

    /// Exact match first, then the 200 schema.
    pub fn for_status(&self, status: u16) -> Option<&SchemaRef> {
        self.0.get(&status).or_else(|| self.0.get(&200))
    }

    pub fn contains(&self, status: u16) -> bool {
        self.0.contains_key(&status)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &SchemaRef)> {
        self.0.iter().map(|(status, schema)| (*status, schema))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything known about one route. Immutable once registered.
pub struct RouteSchema {
    pub operation_id: String,
    pub method: HttpMethod,
    /// URL template, e.g. `/users/{id}`.
    pub path: String,
    pub is_catch_all: bool,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub query_schema: Option<SchemaRef>,
    pub path_schema: Option<SchemaRef>,
    pub body_schema: Option<SchemaRef>,
    pub responses: ResolvedResponses,
    pub middleware: Vec<MiddlewareRef>,
    pub transform: Option<ResponseTransform>,
}

impl RouteSchema {
    /// Minimal schema for `method path`; the remaining fields start empty.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            operation_id: path.clone(),
            method,
            is_catch_all: path.contains("{*"),
            path,
            title: None,
            summary: None,
            description: None,
            query_schema: None,
            path_schema: None,
            body_schema: None,
            responses: ResolvedResponses::default(),
            middleware: Vec::new(),
            transform: None,
        }
    }

    /// True when any part of the request is validated.
    pub fn validates_input(&self) -> bool {
        self.query_schema.is_some()
            || self.path_schema.is_some()
            || (self.method.carries_body() && self.body_schema.is_some())
    }
}

impl fmt::Debug for RouteSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSchema")
            .field("operation_id", &self.operation_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("responses", &self.responses.0.keys().collect::<Vec<_>>())
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Append-only, insertion-ordered route collection used during startup.
#[derive(Default)]
pub struct Registry {
    routes: Vec<Arc<RouteSchema>>,
    keys: HashSet<(HttpMethod, String)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route. A second route with the same method and path is rejected.
    pub fn register(&mut self, schema: RouteSchema) -> Result<Arc<RouteSchema>, RegistryError> {
        let key = (schema.method, schema.path.clone());
        if self.keys.contains(&key) {
            tracing::error!(
                method = %schema.method,
                path = %schema.path,
                "Duplicate (method, path) registration"
            );
            return Err(RegistryError::DuplicateRouteRegistration {
                method: schema.method,
                path: schema.path,
            });
        }
        self.keys.insert(key);

        let schema = Arc::new(schema);
        self.routes.push(schema.clone());
        tracing::debug!(
            method = %schema.method,
            path = %schema.path,
            operation_id = %schema.operation_id,
            total_routes = self.routes.len(),
            "Registered route"
        );
        Ok(schema)
    }

    pub fn all(&self) -> &[Arc<RouteSchema>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Ends the registration phase.
    pub fn freeze(self) -> FrozenRegistry {
        let index = self
            .routes
            .iter()
            .enumerate()
            .map(|(i, r)| ((r.method, r.path.clone()), i))
            .collect();
        FrozenRegistry {
            routes: self.routes,
            index,
        }
    }
}

/// Read-only registry shared by the document endpoints and tooling.
#[derive(Default)]
pub struct FrozenRegistry {
    routes: Vec<Arc<RouteSchema>>,
    index: HashMap<(HttpMethod, String), usize>,
}

impl FrozenRegistry {
    pub fn all(&self) -> &[Arc<RouteSchema>] {
        &self.routes
    }

    pub fn find(&self, method: HttpMethod, path: &str) -> Option<&Arc<RouteSchema>> {
        self.index
            .get(&(method, path.to_string()))
            .and_then(|i| self.routes.get(*i))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Lock-free access to the current frozen registry.
pub struct RegistryHandle {
    inner: ArcSwap<FrozenRegistry>,
}

impl RegistryHandle {
    pub fn new(registry: FrozenRegistry) -> Self {
        Self {
            inner: ArcSwap::from_pointee(registry),
        }
    }

    pub fn load(&self) -> Arc<FrozenRegistry> {
        self.inner.load_full()
    }

    /// Publishes `registry`; readers holding the previous one keep it alive.
    /// Returns the replaced registry.
    pub fn replace(&self, registry: FrozenRegistry) -> Arc<FrozenRegistry> {
        let previous = self.inner.swap(Arc::new(registry));
        tracing::info!(
            routes = self.inner.load().len(),
            previous_routes = previous.len(),
            "Route registry replaced"
        );
        previous
    }
}

impl Default for RegistryHandle {
    fn default() -> Self {
        Self::new(FrozenRegistry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::null_schema;

    #[test]
    fn duplicate_method_and_path_is_rejected() {
        let mut registry = Registry::new();
        registry
            .register(RouteSchema::new(HttpMethod::Get, "/pages/{page}"))
            .unwrap();
        let err = registry
            .register(RouteSchema::new(HttpMethod::Get, "/pages/{page}"))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateRouteRegistration { method: HttpMethod::Get, ref path } if path == "/pages/{page}"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_path_different_method_is_fine() {
        let mut registry = Registry::new();
        registry
            .register(RouteSchema::new(HttpMethod::Get, "/users"))
            .unwrap();
        registry
            .register(RouteSchema::new(HttpMethod::Post, "/users"))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn insertion_order_survives_freeze() {
        let mut registry = Registry::new();
        for path in ["/b", "/a", "/c"] {
            registry
                .register(RouteSchema::new(HttpMethod::Get, path))
                .unwrap();
        }
        let frozen = registry.freeze();
        let paths: Vec<_> = frozen.all().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/b", "/a", "/c"]);
        assert!(frozen.find(HttpMethod::Get, "/a").is_some());
        assert!(frozen.find(HttpMethod::Post, "/a").is_none());
    }

    #[test]
    fn handle_swaps_atomically() {
        let handle = RegistryHandle::default();
        let before = handle.load();
        assert!(before.is_empty());

        let mut next = Registry::new();
        next.register(RouteSchema::new(HttpMethod::Get, "/"))
            .unwrap();
        let previous = handle.replace(next.freeze());

        assert!(previous.is_empty());
        assert!(before.is_empty(), "old readers keep their snapshot");
        assert_eq!(handle.load().len(), 1);
    }

    #[test]
    fn responses_fall_back_to_200() {
        let mut map = BTreeMap::new();
        map.insert(200, null_schema());
        let responses = ResolvedResponses::new(map);
        assert!(responses.for_status(204).is_some());
        assert!(ResolvedResponses::default().for_status(200).is_none());
    }

    #[test]
    fn catch_all_is_detected_from_the_template() {
        assert!(RouteSchema::new(HttpMethod::Get, "/api/{*path}").is_catch_all);
        assert!(!RouteSchema::new(HttpMethod::Get, "/api/{id}").is_catch_all);
    }
}
