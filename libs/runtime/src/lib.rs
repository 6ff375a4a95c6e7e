//! Process-level plumbing shared by the server binary: layered configuration,
//! logging setup, home directory resolution and shutdown handling.

pub mod config;
pub mod logging;
pub mod paths;
pub mod shutdown;

pub use config::{AppConfig, CliArgs, FileLogConfig, LoggingConfig, RoutesConfig, ServerConfig};
pub use logging::init_logging_from_config;
pub use shutdown::{cancel_when, signal_token};
