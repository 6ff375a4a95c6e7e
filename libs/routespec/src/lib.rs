//! Runtime side of file-routed API contracts.
//!
//! Route modules declare themselves with [`define_meta`] and bind a handler,
//! which yields a [`Pipeline`]. Declarations land in a [`Registry`]; once it is
//! frozen the [`DocumentAssembler`] derives the API document from it.

pub mod api;
pub mod document;
pub mod error;
pub mod meta;
pub mod pipeline;
pub mod registry;
pub mod schema;

pub use api::{ErrorBody, HttpError, InputSource, PipelineError};
pub use document::options::DocumentOptions;
pub use document::DocumentAssembler;
pub use error::{DeclarationError, DocumentError, RegistryError};
pub use meta::{define_meta, ResponseSchemas, RouteDefinition, RouteMeta};
pub use pipeline::{Pipeline, PipelineRequest, PipelineResponse, Stage};
pub use registry::{FrozenRegistry, Registry, RegistryHandle, RouteSchema};
pub use routespec_build::HttpMethod;
pub use schema::{Schema, SchemaRef};

/// Everything a route module needs.
pub mod prelude {
    pub use crate::api::HttpError;
    pub use crate::meta::{define_meta, ResponseSchemas, RouteMeta};
    pub use crate::pipeline::cache::CacheOptions;
    pub use crate::pipeline::context::RequestContext;
    pub use crate::pipeline::handler::{handler_fn, HandlerInput, HandlerOutput};
    pub use crate::pipeline::middleware::{middleware_fn, ApiKeyAuth, RateLimit};
    pub use crate::pipeline::transform::{compose, envelope, pick_fields, ResponseTransform};
    pub use crate::pipeline::Pipeline;
    pub use crate::registry::Registry;
    pub use crate::schema::{json_schema, null_schema, schema, SchemaRef};
}
