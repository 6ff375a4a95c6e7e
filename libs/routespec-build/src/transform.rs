//! Applies the annotator to route files on disk.
//!
//! Typical use is from a `build.rs`:
//!
//! ```no_run
//! use routespec_build::BuildTransform;
//!
//! let out_dir = std::env::var("OUT_DIR").unwrap();
//! let report = BuildTransform::new("src/routes")
//!     .transform_tree(std::path::Path::new(&out_dir).join("routes"))
//!     .unwrap();
//! for skipped in &report.skipped {
//!     println!("cargo:warning=skipped {}", skipped.path.display());
//! }
//! ```

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::annotate::{annotate_with, AnnotateOptions, Annotated};
use crate::error::BuildError;
use crate::route_meta::RouteMetadata;

/// Identifiers starting with this prefix belong to generated or virtual modules.
pub const DEFAULT_MARKER_PREFIX: &str = "\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Internal,
    OutsideRoutes,
    NotRust,
    CatchAllUnsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Transform,
    Skip(SkipReason),
}

#[derive(Debug, Clone)]
pub struct TransformedFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub metadata: RouteMetadata,
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct TreeReport {
    /// Sorted by source path.
    pub transformed: Vec<TransformedFile>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct BuildTransform {
    routes_root: PathBuf,
    marker_prefix: String,
    catch_all_supported: bool,
    options: AnnotateOptions,
}

impl BuildTransform {
    pub fn new(routes_root: impl Into<PathBuf>) -> Self {
        Self {
            routes_root: routes_root.into(),
            marker_prefix: DEFAULT_MARKER_PREFIX.to_string(),
            catch_all_supported: true,
            options: AnnotateOptions::default(),
        }
    }

    pub fn marker_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.marker_prefix = prefix.into();
        self
    }

    pub fn catch_all_supported(mut self, supported: bool) -> Self {
        self.catch_all_supported = supported;
        self
    }

    pub fn callee(mut self, callee: impl Into<String>) -> Self {
        self.options.callee = callee.into();
        self
    }

    pub fn with_source_maps(mut self, enabled: bool) -> Self {
        self.options.source_map = enabled;
        self
    }

    pub fn routes_root(&self) -> &Path {
        &self.routes_root
    }

    /// Decides whether the module identified by `id` is a route to annotate.
    pub fn inclusion(&self, id: &str) -> Inclusion {
        if !self.marker_prefix.is_empty() && id.starts_with(&self.marker_prefix) {
            return Inclusion::Skip(SkipReason::Internal);
        }

        let path = Path::new(id);
        let Ok(relative) = path.strip_prefix(&self.routes_root) else {
            return Inclusion::Skip(SkipReason::OutsideRoutes);
        };
        if path.extension().and_then(|e| e.to_str()) != Some("rs") {
            return Inclusion::Skip(SkipReason::NotRust);
        }

        if !self.catch_all_supported {
            let catch_all = relative
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with("[..."));
            if catch_all {
                tracing::warn!(
                    file = %id,
                    "catch-all routes are not supported by the target router, skipping"
                );
                return Inclusion::Skip(SkipReason::CatchAllUnsupported);
            }
        }

        Inclusion::Transform
    }

    /// Route metadata for a file under the routes root; `file_path` keeps `id`.
    pub fn metadata_for(&self, id: &str) -> Result<RouteMetadata, BuildError> {
        let relative = Path::new(id)
            .strip_prefix(&self.routes_root)
            .map_err(|_| {
                BuildError::invalid_path(
                    id,
                    format!("not under '{}'", self.routes_root.display()),
                )
            })?;
        let mut meta = RouteMetadata::from_relative(&relative.to_string_lossy())?;
        meta.file_path = id.to_string();
        Ok(meta)
    }

    /// Annotates one module; `Ok(None)` when the module is not a route.
    pub fn transform_file(&self, id: &str, code: &str) -> Result<Option<Annotated>, BuildError> {
        if self.inclusion(id) != Inclusion::Transform {
            return Ok(None);
        }
        let meta = self.metadata_for(id)?;
        annotate_with(code, &meta, &self.options).map(Some)
    }

    /// Annotates every route under the routes root into `out_dir`, keeping
    /// the directory layout. The first error aborts the pass.
    pub fn transform_tree(&self, out_dir: impl AsRef<Path>) -> Result<TreeReport, BuildError> {
        let out_dir = out_dir.as_ref();
        let mut files = Vec::new();
        collect_files(&self.routes_root, &mut files)?;
        files.sort();

        let mut report = TreeReport::default();
        let mut jobs = Vec::new();
        for file in files {
            match self.inclusion(&file.to_string_lossy()) {
                Inclusion::Transform => jobs.push(file),
                Inclusion::Skip(reason) => report.skipped.push(SkippedFile { path: file, reason }),
            }
        }

        let workers = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
            .clamp(1, jobs.len().max(1));
        let batch = jobs.len().div_ceil(workers).max(1);

        let results: Vec<Result<TransformedFile, BuildError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .chunks(batch)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|file| self.transform_one(file, out_dir))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
                .collect()
        });

        for result in results {
            report.transformed.push(result?);
        }
        tracing::debug!(
            transformed = report.transformed.len(),
            skipped = report.skipped.len(),
            "route tree annotated"
        );
        Ok(report)
    }

    fn transform_one(&self, file: &Path, out_dir: &Path) -> Result<TransformedFile, BuildError> {
        let id = file.to_string_lossy();
        let code = fs::read_to_string(file).map_err(|e| BuildError::io(file, e))?;
        let metadata = self.metadata_for(&id)?;
        let annotated = annotate_with(&code, &metadata, &self.options)?;

        let relative = file
            .strip_prefix(&self.routes_root)
            .map_err(|_| BuildError::invalid_path(id.to_string(), "not under the routes root"))?;
        let output = out_dir.join(relative);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::write(&output, &annotated.code).map_err(|e| BuildError::io(&output, e))?;

        Ok(TransformedFile {
            source: file.to_path_buf(),
            output,
            metadata,
            changed: annotated.changed,
        })
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), BuildError> {
    let entries = fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| BuildError::io(dir, e))?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
