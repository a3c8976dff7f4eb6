//! CLI binary for edgequake-docconv.
//!
//! A thin shim over the library crate that maps flags and environment
//! variables to `ServiceConfig`, then either runs the HTTP service, performs a
//! single expiry sweep, or probes the LibreOffice installation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_docconv::expiry::sweep_once;
use edgequake_docconv::server::shutdown_signal;
use edgequake_docconv::{
    serve, spawn_scheduler, AppState, ConversionService, ExpiryPolicy, ServiceConfig,
    ShutdownOutcome,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"
ENDPOINTS (serve):
  POST /convert              multipart form: file=<upload>, format=<target> (default txt)
  GET  /download/<date>/<f>  download a converted file
  GET  /health               engine status and configuration

EXAMPLES:
  docconv                                     Serve on 0.0.0.0:15000
  curl -F file=@report.docx -F format=pdf http://localhost:15000/convert
  curl -F file=@scan.pdf http://localhost:15000/convert   PDF to text (via odt)
  docconv sweep                               Delete expired files once and exit
  docconv probe                               Show which soffice would be used

ENVIRONMENT VARIABLES:
  Every flag can also be set through the variable shown in --help.
  A .env file in the working directory is loaded first when present.
"#;

/// Document conversion service backed by LibreOffice.
#[derive(Parser, Debug)]
#[command(
    name = "docconv",
    version,
    about = "Convert documents with LibreOffice over HTTP",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// LibreOffice executable: a program name looked up on PATH, or a path.
    #[arg(long, env = "SOFFICE_PATH", default_value = "soffice", global = true)]
    soffice_path: PathBuf,

    /// Directory for converted files.
    #[arg(long, env = "DOCCONV_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Directory for per-request scratch workspaces.
    #[arg(long, env = "DOCCONV_TMP_DIR", default_value = "tmp", global = true)]
    tmp_dir: PathBuf,

    /// Hours converted files are kept; 0 or less keeps them forever.
    #[arg(
        long,
        env = "FILE_EXPIRY_HOURS",
        default_value_t = 24,
        allow_negative_numbers = true,
        global = true
    )]
    file_expiry_hours: i64,

    /// Seconds between expiry sweeps.
    #[arg(long, env = "DOCCONV_SWEEP_INTERVAL_SECS", default_value_t = 3600, global = true)]
    sweep_interval_secs: u64,

    /// Seconds one LibreOffice run may take before it is killed.
    #[arg(long, env = "DOCCONV_ENGINE_TIMEOUT_SECS", default_value_t = 120, global = true)]
    engine_timeout_secs: u64,

    /// Maximum upload size in bytes.
    #[arg(long, env = "MAX_CONTENT_LENGTH", default_value_t = 100 * 1024 * 1024, global = true)]
    max_content_length: usize,

    /// Maximum simultaneous conversions; 0 means unbounded.
    #[arg(long, env = "DOCCONV_MAX_CONCURRENCY", default_value_t = 0, global = true)]
    max_concurrency: usize,

    /// Listen address.
    #[arg(long, env = "DOCCONV_HOST", default_value = "0.0.0.0", global = true)]
    host: String,

    /// Listen port.
    #[arg(short, long, env = "PORT", default_value_t = 15000, global = true)]
    port: u16,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DEBUG", global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the HTTP service (default).
    Serve,
    /// Run one expiry sweep over the data directory and exit.
    Sweep,
    /// Locate LibreOffice and print its version.
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before parsing so `env = ...` sees .env values.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.debug {
        "edgequake_docconv=debug,soffice_locate=debug,tower_http=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if let Ok(path) = &dotenv {
        debug!(path = %path.display(), "Loaded environment file");
    }

    let config = Arc::new(build_config(&cli)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(config).await,
        Command::Sweep => run_sweep(&config).await,
        Command::Probe => run_probe(&config).await,
    }
}

fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    ServiceConfig::builder()
        .soffice_path(cli.soffice_path.clone())
        .data_dir(cli.data_dir.clone())
        .tmp_dir(cli.tmp_dir.clone())
        .expiry(ExpiryPolicy::from_hours(cli.file_expiry_hours))
        .sweep_interval(Duration::from_secs(cli.sweep_interval_secs))
        .engine_timeout(Duration::from_secs(cli.engine_timeout_secs))
        .max_content_length(cli.max_content_length)
        .max_concurrent_conversions(cli.max_concurrency)
        .host(cli.host.clone())
        .port(cli.port)
        .debug(cli.debug)
        .build()
        .context("Invalid configuration")
}

// ── serve ────────────────────────────────────────────────────────────────────

async fn run_serve(config: Arc<ServiceConfig>) -> Result<()> {
    for dir in [&config.data_dir, &config.tmp_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let service = ConversionService::start(Arc::clone(&config)).await;
    let scheduler = spawn_scheduler(&config);

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    match config.expiry.ttl() {
        Some(_) => info!(
            address = %addr,
            data_dir = %config.data_dir.display(),
            expiry_hours = config.expiry.hours(),
            "docconv started"
        ),
        None => info!(
            address = %addr,
            data_dir = %config.data_dir.display(),
            "docconv started; files never expire"
        ),
    }

    let report = serve(
        listener,
        AppState::new(Arc::new(service)),
        scheduler,
        shutdown_signal(),
    )
    .await
    .context("Server error")?;

    if report.server == ShutdownOutcome::TimedOut
        || report.scheduler == Some(ShutdownOutcome::TimedOut)
    {
        warn!("Forced exit after shutdown grace period");
    }
    Ok(())
}

// ── sweep ────────────────────────────────────────────────────────────────────

async fn run_sweep(config: &ServiceConfig) -> Result<()> {
    let Some(ttl) = config.expiry.ttl() else {
        println!("Files never expire (FILE_EXPIRY_HOURS <= 0); nothing to do.");
        return Ok(());
    };

    let report = sweep_once(config.data_dir.clone(), ttl)
        .await
        .context("Expiry sweep failed")?;

    println!(
        "{} {}: {} files, {} directories removed, {} errors",
        green("✓"),
        bold(&config.data_dir.display().to_string()),
        report.removed_files,
        report.removed_dirs,
        report.errors
    );
    Ok(())
}

// ── probe ────────────────────────────────────────────────────────────────────

async fn run_probe(config: &ServiceConfig) -> Result<()> {
    let program = config.soffice_path.to_string_lossy().into_owned();
    let result = tokio::task::spawn_blocking(move || {
        let path = soffice_locate::locate_soffice(&program)?;
        let version =
            soffice_locate::probe_version(&path, soffice_locate::DEFAULT_PROBE_TIMEOUT)?;
        Ok::<_, soffice_locate::LocateError>((path, version))
    })
    .await
    .context("Probe task failed")?;

    match result {
        Ok((path, version)) => {
            println!("{} {}", green("✓"), bold(&version));
            println!("  {}", path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", red("✗"), e);
            Err(e).context("LibreOffice is not usable")
        }
    }
}
