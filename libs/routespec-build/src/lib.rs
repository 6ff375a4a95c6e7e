//! Build-time half of routespec.
//!
//! Route files are named after the URL they serve. This crate turns a file
//! path into [`RouteMetadata`] and writes that metadata into the route's
//! `define_meta` call, so a handler never spells out its own URL or method.
//! It has no runtime dependencies and is meant to be used from `build.rs`.

pub mod annotate;
pub mod error;
pub mod method;
pub mod route_meta;
pub mod transform;

pub use annotate::{annotate, annotate_with, AnnotateOptions, Annotated, SourceMap};
pub use error::{BuildError, UnknownMethod};
pub use method::HttpMethod;
pub use route_meta::{
    extract_route_metadata, RouteMetadata, CATCH_ALL_PARAM, DEFAULT_ROOT_MARKER,
};
pub use transform::{
    BuildTransform, Inclusion, SkipReason, SkippedFile, TransformedFile, TreeReport,
};
