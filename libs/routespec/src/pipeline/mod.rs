//! Per-request validation pipeline.
//!
//! Each request moves through
//! `Start → Middleware → RequestValidated → HandlerInvoked → ResponseValidated
//! → Transformed → Completed`, and may drop to `Failed` from any stage. A
//! failure is always answered with the uniform [`ErrorBody`](crate::api::ErrorBody);
//! nothing a middleware or handler does can take the process down.

pub mod cache;
pub mod context;
pub mod handler;
pub mod middleware;
pub mod transform;

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::FutureExt;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use routespec_build::HttpMethod;
use serde_json::{Map, Value};
use tracing::Instrument;

use crate::api::{InputSource, MiddlewareFailure, PipelineError};
use crate::registry::RouteSchema;
use crate::schema::SchemaRef;

use self::cache::{CacheOptions, ResponseCache};
use self::context::RequestContext;
use self::handler::{HandlerInput, HandlerOutput, HandlerRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Start,
    Middleware,
    RequestValidated,
    HandlerInvoked,
    ResponseValidated,
    Transformed,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Start => "START",
            Stage::Middleware => "MIDDLEWARE",
            Stage::RequestValidated => "REQUEST_VALIDATED",
            Stage::HandlerInvoked => "HANDLER_INVOKED",
            Stage::ResponseValidated => "RESPONSE_VALIDATED",
            Stage::Transformed => "TRANSFORMED",
            Stage::Completed => "COMPLETED",
            Stage::Failed => "FAILED",
        })
    }
}

/// Raw request parts as extracted by the HTTP host.
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub context: RequestContext,
    pub path_params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
}

impl PipelineRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            context: RequestContext::new(method, path),
            ..Default::default()
        }
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params
            .insert(name.into(), Value::String(value.into()));
        self
    }

    /// Repeated keys collect into an array.
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = Value::String(value.into());
        match self.query.entry(name.into()) {
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            serde_json::map::Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.context.headers.append(name, value);
            }
            _ => tracing::warn!(header = %name, "ignoring invalid request header"),
        }
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.context.request_id = Some(id.into());
        self
    }

    pub fn client(mut self, client: impl Into<String>) -> Self {
        self.context.client = Some(client.into());
        self
    }
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineResponse {
    pub status: u16,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    /// `Completed` or `Failed`.
    pub stage: Stage,
    pub error: Option<PipelineError>,
}

impl PipelineResponse {
    fn failed(error: PipelineError) -> Self {
        let body = serde_json::to_value(error.to_body()).ok();
        Self {
            status: error.status(),
            body,
            headers: HeaderMap::new(),
            stage: Stage::Failed,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.stage == Stage::Completed
    }
}

impl IntoResponse for PipelineResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut resp = match self.body {
            Some(body) => (status, Json(body)).into_response(),
            None => status.into_response(),
        };
        resp.headers_mut().extend(self.headers);
        resp
    }
}

/// A registered route bound to its handler.
#[derive(Clone)]
pub struct Pipeline {
    schema: Arc<RouteSchema>,
    handler: HandlerRef,
    cache: Option<Arc<ResponseCache>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("schema", &self.schema)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl Pipeline {
    pub fn new(schema: Arc<RouteSchema>, handler: HandlerRef) -> Self {
        Self {
            schema,
            handler,
            cache: None,
        }
    }

    pub fn with_cache(mut self, options: CacheOptions) -> Self {
        self.cache = Some(Arc::new(ResponseCache::new(options)));
        self
    }

    pub fn schema(&self) -> &Arc<RouteSchema> {
        &self.schema
    }

    /// Starts a request for this route's method.
    pub fn request(&self, path: impl Into<String>) -> PipelineRequest {
        PipelineRequest::new(self.schema.method, path)
    }

    pub async fn execute(&self, request: PipelineRequest) -> PipelineResponse {
        let span = tracing::debug_span!(
            "pipeline",
            method = %self.schema.method,
            route = %self.schema.path,
            request_id = request.context.request_id.as_deref().unwrap_or("-"),
        );

        async move {
            match self.run(request).await {
                Ok(response) => {
                    tracing::debug!(status = response.status, "request completed");
                    response
                }
                Err(err) => {
                    let status = err.status();
                    if status >= 500 {
                        tracing::error!(status, stage = %err.stage(), error = ?err, "request failed");
                    } else {
                        tracing::warn!(status, stage = %err.stage(), error = %err, "request rejected");
                    }
                    PipelineResponse::failed(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        let PipelineRequest {
            mut context,
            path_params,
            query,
            body,
        } = request;
        enter(Stage::Start);

        enter(Stage::Middleware);
        for mw in &self.schema.middleware {
            let outcome = AssertUnwindSafe(mw.handle(&mut context))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(rejection)) => MiddlewareFailure::Rejected(rejection),
                Err(panic) => MiddlewareFailure::Panicked(panic_message(panic)),
            };
            return Err(PipelineError::Middleware {
                name: mw.name().to_string(),
                failure,
            });
        }

        let query = validate_params(self.schema.query_schema.as_ref(), query, InputSource::Query)?;
        let path = validate_params(
            self.schema.path_schema.as_ref(),
            path_params,
            InputSource::Path,
        )?;
        let body = if self.schema.method.carries_body() {
            let raw = body.unwrap_or(Value::Null);
            match &self.schema.body_schema {
                Some(schema) => schema.validate(&raw).map_err(|errors| {
                    PipelineError::RequestValidation {
                        location: InputSource::Body,
                        errors,
                    }
                })?,
                None => raw,
            }
        } else {
            Value::Null
        };
        enter(Stage::RequestValidated);

        let input = HandlerInput {
            context,
            path,
            query,
            body,
        };
        let output = self.invoke(input).await?;
        enter(Stage::HandlerInvoked);

        let HandlerOutput {
            status,
            body,
            headers,
        } = output;
        let body = match self.schema.responses.for_status(status) {
            Some(schema) => {
                let validated = schema
                    .validate(body.as_ref().unwrap_or(&Value::Null))
                    .map_err(|errors| PipelineError::ResponseValidation { status, errors })?;
                Some(validated).filter(|v| !v.is_null())
            }
            None => match body {
                Some(v) if !v.is_null() => {
                    return Err(PipelineError::UnregisteredResponseSchema { status })
                }
                _ => None,
            },
        };
        enter(Stage::ResponseValidated);

        let body = match &self.schema.transform {
            Some(_) if is_bodiless_status(status) => None,
            Some(transform) => Some(transform.apply(body.unwrap_or(Value::Null), status)),
            None => body,
        };
        enter(Stage::Transformed);

        Ok(PipelineResponse {
            status,
            body,
            headers,
            stage: Stage::Completed,
            error: None,
        })
    }

    async fn invoke(&self, input: HandlerInput) -> Result<HandlerOutput, PipelineError> {
        let key = self.cache.as_ref().map(|_| cache::cache_key(&input));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                tracing::debug!("served from response cache");
                return Ok(hit);
            }
        }

        let output = match AssertUnwindSafe(self.handler.call(input))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(PipelineError::Handler(err)),
            Err(panic) => return Err(PipelineError::HandlerPanicked(panic_message(panic))),
        };

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            if output.is_success() {
                cache.insert(key, output.clone());
            }
        }
        Ok(output)
    }
}

/// Statuses that never carry a response body.
fn is_bodiless_status(status: u16) -> bool {
    matches!(status, 204 | 304)
}

fn enter(stage: Stage) {
    tracing::trace!(%stage, "pipeline stage");
}

fn validate_params(
    schema: Option<&SchemaRef>,
    raw: Map<String, Value>,
    location: InputSource,
) -> Result<Value, PipelineError> {
    match schema {
        Some(schema) => {
            let coerced = schema.coerce_params(raw);
            schema
                .validate(&coerced)
                .map_err(|errors| PipelineError::RequestValidation { location, errors })
        }
        None => Ok(Value::Object(raw)),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
