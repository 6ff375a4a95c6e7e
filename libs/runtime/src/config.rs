//! Layered application configuration.
//!
//! Values come from built-in defaults, then the YAML file, then `APP__`
//! environment variables (`APP__SERVER__PORT=9000` sets `server.port`).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::paths::home_dir::resolve_home_dir;

const HOME_SUBDIR: &str = ".routespec";
const ENV_PREFIX: &str = "APP__";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    /// Per-module settings, read through [`AppConfig::module_config`].
    #[serde(default)]
    pub modules: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Base for relative log paths. Empty means `~/.routespec`; always
    /// absolute after loading.
    pub home_dir: String,
    pub host: String,
    pub port: u16,
    /// Per-request timeout; 0 keeps the ingress default.
    #[serde(default)]
    pub timeout_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            home_dir: String::new(),
            host: "127.0.0.1".to_string(),
            port: 8087,
            timeout_sec: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct RoutesConfig {
    /// Directory holding the route files.
    pub root: String,
    /// Path segment that marks the start of the route tree.
    pub root_marker: String,
    /// Module identifiers with this prefix are never annotated.
    pub marker_prefix: String,
    /// Whether `[...name]` files are turned into catch-all routes.
    pub catch_all_supported: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            root: "src/routes".to_string(),
            root_marker: "routes".to_string(),
            marker_prefix: "\0".to_string(),
            catch_all_supported: true,
        }
    }
}

/// Console and file logging.
///
/// `targets` maps a tracing target prefix to a level and applies to both
/// outputs, e.g. `routespec::pipeline: debug` or `routespec_build: warn`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub console_level: String,
    pub targets: BTreeMap<String, String>,
    /// JSON log file; `None` logs to the console only.
    pub file: Option<FileLogConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_level: "info".to_string(),
            targets: BTreeMap::new(),
            file: Some(FileLogConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct FileLogConfig {
    /// Relative paths are resolved against `server.home_dir`.
    pub path: String,
    pub level: String,
    /// Rotated files kept next to the active one.
    pub max_backups: usize,
    pub max_size_mb: u64,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            path: "logs/routespec.log".to_string(),
            level: "debug".to_string(),
            max_backups: 3,
            max_size_mb: 100,
        }
    }
}

/// Command line values that override the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub port: Option<u16>,
    pub print_config: bool,
    pub verbose: u8,
}

impl AppConfig {
    /// Loads `config_path` over the defaults, then applies environment
    /// overrides and resolves `server.home_dir` (creating it).
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        if !config_path.is_file() {
            anyhow::bail!("config file not found: {}", config_path.display());
        }

        let mut config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("invalid configuration in {}", config_path.display()))?;

        config.resolve_home_dir()?;
        Ok(config)
    }

    /// Like [`load_layered`](Self::load_layered) when a path is given,
    /// otherwise the defaults with a resolved home directory.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut config = Self::default();
                config.resolve_home_dir()?;
                Ok(config)
            }
        }
    }

    fn resolve_home_dir(&mut self) -> Result<()> {
        let configured = Some(self.server.home_dir.trim())
            .filter(|dir| !dir.is_empty())
            .map(str::to_string);
        let resolved = resolve_home_dir(configured, HOME_SUBDIR, true)
            .context("failed to resolve server.home_dir")?;
        self.server.home_dir = resolved.to_string_lossy().into_owned();
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize config to YAML")
    }

    /// `--port` replaces `server.port`; each `-v` raises the console level
    /// (debug, then trace).
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        match args.verbose {
            0 => {}
            1 => self.logging.console_level = "debug".to_string(),
            _ => self.logging.console_level = "trace".to_string(),
        }
    }

    /// Typed view of one entry of the module bag; defaults when absent.
    pub fn module_config<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.modules.get(name) {
            Some(value) => serde_json::from_value(value.clone())
                .with_context(|| format!("invalid configuration for module '{name}'")),
            None => Ok(T::default()),
        }
    }
}
