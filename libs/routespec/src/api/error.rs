use std::fmt;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::problem::{ErrorBody, HttpError};
use crate::pipeline::Stage;
use crate::schema::FieldError;

/// Which part of the request failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Query,
    Path,
    Body,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputSource::Query => "query",
            InputSource::Path => "path",
            InputSource::Body => "body",
        })
    }
}

#[derive(Debug, Error)]
pub enum MiddlewareFailure {
    #[error(transparent)]
    Rejected(HttpError),
    #[error("panicked: {0}")]
    Panicked(String),
}

/// Request-time failures. Each is turned into an [`ErrorBody`] for the client.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("middleware '{name}' failed: {failure}")]
    Middleware {
        name: String,
        failure: MiddlewareFailure,
    },

    #[error("invalid {location}: {} field error(s)", .errors.len())]
    RequestValidation {
        location: InputSource,
        errors: Vec<FieldError>,
    },

    #[error(transparent)]
    Handler(HttpError),

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("no response schema registered for status {status}")]
    UnregisteredResponseSchema { status: u16 },

    #[error("response with status {status} does not match its schema")]
    ResponseValidation { status: u16, errors: Vec<FieldError> },
}

impl PipelineError {
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::Middleware {
                failure: MiddlewareFailure::Rejected(e),
                ..
            }
            | PipelineError::Handler(e) => e.status,
            PipelineError::RequestValidation { .. } => 400,
            _ => 500,
        }
    }

    /// Stage the request was in when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Middleware { .. } => Stage::Middleware,
            PipelineError::RequestValidation { .. } => Stage::RequestValidated,
            PipelineError::Handler(_) | PipelineError::HandlerPanicked(_) => Stage::HandlerInvoked,
            PipelineError::UnregisteredResponseSchema { .. }
            | PipelineError::ResponseValidation { .. } => Stage::ResponseValidated,
        }
    }

    /// Client-facing body. Internal details stay in the logs.
    pub fn to_body(&self) -> ErrorBody {
        match self {
            PipelineError::Middleware {
                failure: MiddlewareFailure::Rejected(e),
                ..
            }
            | PipelineError::Handler(e) => e.to_body(),
            PipelineError::RequestValidation { location, errors } => ErrorBody::from_status(400)
                .with_data(json!({ "source": location, "errors": errors })),
            _ => ErrorBody::from_status(500),
        }
    }
}
