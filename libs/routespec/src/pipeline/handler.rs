use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::context::RequestContext;
use crate::api::HttpError;

/// Validated request parts handed to a route handler.
#[derive(Debug, Clone)]
pub struct HandlerInput {
    pub context: RequestContext,
    pub path: Value,
    pub query: Value,
    pub body: Value,
}

impl HandlerInput {
    pub fn path_as<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        decode(&self.path, "path")
    }

    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        decode(&self.query, "query")
    }

    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        decode(&self.body, "body")
    }
}

fn decode<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T, HttpError> {
    T::deserialize(value).map_err(|e| HttpError::bad_request(format!("invalid {what}: {e}")))
}

/// Candidate response produced by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    pub status: u16,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl HandlerOutput {
    pub fn with_status(status: u16, body: Option<Value>) -> Self {
        Self {
            status,
            body,
            headers: HeaderMap::new(),
        }
    }

    pub fn ok(body: impl Serialize) -> Result<Self, HttpError> {
        Self::json(200, body)
    }

    pub fn created(body: impl Serialize) -> Result<Self, HttpError> {
        Self::json(201, body)
    }

    pub fn no_content() -> Self {
        Self::with_status(204, None)
    }

    pub fn json(status: u16, body: impl Serialize) -> Result<Self, HttpError> {
        let body = serde_json::to_value(body).map_err(|e| {
            tracing::error!(error = %e, "failed to serialize handler output");
            HttpError::internal()
        })?;
        Ok(Self::with_status(status, Some(body)))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait RouteHandler: Send + Sync + 'static {
    async fn call(&self, input: HandlerInput) -> Result<HandlerOutput, HttpError>;
}

pub type HandlerRef = Arc<dyn RouteHandler>;

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RouteHandler for FnHandler<F>
where
    F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerOutput, HttpError>> + Send + 'static,
{
    async fn call(&self, input: HandlerInput) -> Result<HandlerOutput, HttpError> {
        (self.0)(input).await
    }
}

/// Wraps an async function as a [`RouteHandler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerRef
where
    F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerOutput, HttpError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
