use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while deriving route metadata or annotating route sources.
///
/// All of them are fatal to the build pass that produced them.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid route path '{path}': {reason}")]
    InvalidRoutePath { path: String, reason: String },

    #[error("duplicate path parameter '{name}' in route '{path}'")]
    DuplicateParameter { path: String, name: String },

    #[error("failed to parse route source at {line}:{column}: {message}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("found {count} `{callee}` declarations with a struct literal argument, expected at most one")]
    AmbiguousDeclaration { callee: String, count: usize },

    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRoutePath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Returned when a string is not one of the supported HTTP verbs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown http method '{0}'")]
pub struct UnknownMethod(pub String);
