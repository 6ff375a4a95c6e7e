use routespec_build::{HttpMethod, UnknownMethod};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("route {method} {path} is already registered")]
    DuplicateRouteRegistration { method: HttpMethod, path: String },
}

/// Failures of [`define_meta`](crate::define_meta). All of them abort startup.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("route metadata was not injected (is the file under the routes root?)")]
    NotAnnotated,
    #[error(transparent)]
    InvalidMethod(#[from] UnknownMethod),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to serialize API document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to build document fetcher: {0}")]
    Client(#[from] reqwest::Error),
}
