pub mod error;
pub mod problem;

pub use error::{InputSource, MiddlewareFailure, PipelineError};
pub use problem::{ErrorBody, HttpError};
