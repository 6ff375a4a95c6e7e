//! Tracing setup: a console layer and an optional rotating JSON file.
//!
//! Both outputs share the per-target overrides from [`LoggingConfig`], so
//! `routespec::pipeline: debug` turns on stage tracing everywhere while the
//! rest of the process stays at its base level. `RUST_LOG`, when set,
//! replaces the console filter.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    filter::Targets,
    fmt::{self, time::UtcTime, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::{FileLogConfig, LoggingConfig};

/// Unknown names fall back to `info`.
pub fn parse_level(raw: &str) -> LevelFilter {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" | "none" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

fn targets_with_default(cfg: &LoggingConfig, default: LevelFilter) -> Targets {
    cfg.targets
        .iter()
        .fold(Targets::new().with_default(default), |targets, (target, level)| {
            targets.with_target(target.clone(), parse_level(level))
        })
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Size-rotated log file shared by every writer handle.
#[derive(Clone)]
struct RotatingFile(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl RotatingFile {
    fn open(path: &Path, cfg: &FileLogConfig) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let max_bytes = usize::try_from(cfg.max_size_mb.max(1))
            .unwrap_or(usize::MAX / (1024 * 1024))
            .saturating_mul(1024 * 1024);
        let rotate = FileRotate::new(
            path,
            AppendTimestamp::default(FileLimit::MaxFiles(cfg.max_backups.max(1))),
            ContentLimit::BytesSurpassed(max_bytes),
            Compression::None,
            #[cfg(unix)]
            None,
        );
        Ok(Self(Arc::new(Mutex::new(rotate))))
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(cfg: &LoggingConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_ansi(io::stdout().is_terminal())
        .with_target(true)
        .with_timer(UtcTime::rfc_3339());
    match EnvFilter::try_from_default_env() {
        Ok(filter) => layer.with_filter(filter).boxed(),
        Err(_) => layer
            .with_filter(targets_with_default(cfg, parse_level(&cfg.console_level)))
            .boxed(),
    }
}

fn file_layer(cfg: &LoggingConfig, base_dir: &Path) -> Option<BoxedLayer> {
    let file = cfg.file.as_ref().filter(|f| !f.path.trim().is_empty())?;
    let path = resolve_log_path(&file.path, base_dir);
    let writer = match RotatingFile::open(&path, file) {
        Ok(writer) => writer,
        Err(e) => {
            // The subscriber is not installed yet.
            eprintln!("failed to open log file '{}': {e}", path.display());
            return None;
        }
    };
    Some(
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(writer)
            .with_filter(targets_with_default(cfg, parse_level(&file.level)))
            .boxed(),
    )
}

/// Installs the global subscriber. Relative file paths resolve against
/// `base_dir` (normally `server.home_dir`). Calling it twice is a no-op.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    let _ = tracing_log::LogTracer::init();

    let layers: Vec<BoxedLayer> = std::iter::once(console_layer(cfg))
        .chain(file_layer(cfg, base_dir))
        .collect();
    let _ = tracing_subscriber::registry().with(layers).try_init();
}
