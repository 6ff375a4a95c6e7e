use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use api_ingress::{ApiIngress, ApiIngressConfig};
use clap::{Parser, Subcommand, ValueEnum};
use mimalloc::MiMalloc;
use routespec::{DocumentAssembler, FrozenRegistry, Pipeline, Registry};
use routespec_build::{extract_route_metadata, BuildTransform};
use runtime::{AppConfig, CliArgs};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod models;

/// Route modules annotated by build.rs.
mod routes {
    include!(concat!(env!("OUT_DIR"), "/routes_index.rs"));
}

const INGRESS_MODULE: &str = "api_ingress";

/// Routespec Server - file-routed handlers with a generated API document
#[derive(Parser)]
#[command(name = "routespec-server")]
#[command(about = "Routespec Server - file-routed handlers with a generated API document")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Check configuration and route declarations
    Check,
    /// List registered routes
    Routes,
    /// Annotate a routes directory into an output directory
    Annotate {
        /// Directory holding the route files
        #[arg(long)]
        routes_dir: Option<PathBuf>,
        /// Where annotated files are written
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Print the route metadata derived from a file path
    Meta {
        /// Route file path containing the routes directory
        path: String,
    },
    /// Print the generated API document
    Openapi {
        #[arg(long, value_enum, default_value_t = DocFormat::Json)]
        format: DocFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DocFormat {
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    // Commands that print machine-readable output keep stdout clean.
    let command = cli.command.unwrap_or(Commands::Run);
    if matches!(command, Commands::Run | Commands::Check) {
        runtime::init_logging_from_config(&config.logging, Path::new(&config.server.home_dir));
        tracing::info!("Routespec Server starting");
    }

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match command {
        Commands::Run => run_server(config, &args).await,
        Commands::Check => check_config(&config),
        Commands::Routes => list_routes(),
        Commands::Annotate {
            routes_dir,
            out_dir,
        } => annotate(&config, routes_dir, &out_dir),
        Commands::Meta { path } => print_meta(&config, &path),
        Commands::Openapi { format } => print_document(&config, format).await,
    }
}

/// Declares every bundled route and freezes the registry.
fn load_routes() -> Result<(FrozenRegistry, Vec<Pipeline>)> {
    let mut registry = Registry::new();
    let pipelines =
        routes::register_routes(&mut registry).context("failed to declare routes")?;
    Ok((registry.freeze(), pipelines))
}

fn ingress_config(config: &AppConfig, args: &CliArgs) -> Result<ApiIngressConfig> {
    let mut ingress: ApiIngressConfig = config.module_config(INGRESS_MODULE)?;
    if !config.modules.contains_key(INGRESS_MODULE) || args.port.is_some() {
        ingress.bind_addr = format!("{}:{}", config.server.host, config.server.port);
    }
    Ok(ingress)
}

async fn run_server(config: AppConfig, args: &CliArgs) -> Result<()> {
    let (registry, pipelines) = load_routes().inspect_err(|e| {
        tracing::error!(error = %e, "route declaration failed");
    })?;
    tracing::info!(routes = registry.len(), "routes declared");

    let mut ingress = ApiIngress::new(ingress_config(&config, args)?, registry, pipelines)?;
    if config.server.timeout_sec > 0 {
        ingress = ingress.request_timeout(Duration::from_secs(config.server.timeout_sec));
    }

    let cancel = runtime::signal_token();
    Arc::new(ingress).serve(cancel).await
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let ingress: ApiIngressConfig = config.module_config(INGRESS_MODULE)?;
    let (registry, _) = load_routes()?;

    tracing::info!("Configuration is valid");
    println!("Configuration check passed");
    println!(
        "{} routes declared, docs {}",
        registry.len(),
        if ingress.enable_docs { "enabled" } else { "disabled" }
    );
    println!("{}", config.to_yaml()?);
    Ok(())
}

fn list_routes() -> Result<()> {
    for (file, method, template) in routes::ROUTE_FILES {
        println!("{method:<7} {template:<28} {file}");
    }
    Ok(())
}

fn annotate(config: &AppConfig, routes_dir: Option<PathBuf>, out_dir: &Path) -> Result<()> {
    let routes_dir = routes_dir.unwrap_or_else(|| PathBuf::from(&config.routes.root));
    let report = BuildTransform::new(&routes_dir)
        .marker_prefix(config.routes.marker_prefix.as_str())
        .catch_all_supported(config.routes.catch_all_supported)
        .transform_tree(out_dir)
        .with_context(|| format!("failed to annotate '{}'", routes_dir.display()))?;

    for file in &report.transformed {
        println!(
            "{:<7} {:<28} {}{}",
            file.metadata.http_method.as_str(),
            file.metadata.url_template,
            file.output.display(),
            if file.changed { "" } else { " (unchanged)" }
        );
    }
    for skipped in &report.skipped {
        println!("skipped {} ({:?})", skipped.path.display(), skipped.reason);
    }
    Ok(())
}

fn print_meta(config: &AppConfig, path: &str) -> Result<()> {
    let meta = extract_route_metadata(path, &config.routes.root_marker)?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

async fn print_document(config: &AppConfig, format: DocFormat) -> Result<()> {
    let ingress: ApiIngressConfig = config.module_config(INGRESS_MODULE)?;
    let (registry, _) = load_routes()?;
    let assembler = if ingress.docs.additional_json_urls.is_empty() {
        DocumentAssembler::offline()
    } else {
        DocumentAssembler::http(&ingress.docs)?
    };

    let document = assembler.generate(&registry, &ingress.docs).await?;
    match format {
        DocFormat::Json => println!("{}", serde_json::to_string_pretty(&document)?),
        DocFormat::Yaml => print!("{}", serde_yaml::to_string(&document)?),
    }
    Ok(())
}
