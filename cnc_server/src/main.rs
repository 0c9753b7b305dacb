//! # CNC Server Binary
//!
//! Publishes the motion telemetry of the CNC turning concept and accepts
//! G-code batches through the `run_g_code` method.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (endpoint opc.tcp://localhost:4840/cnc_concept_turn_155_one)
//! cnc_server
//!
//! # Config file with endpoint override
//! cnc_server --config config/cnc_server.toml --endpoint opc.tcp://0.0.0.0:4840/lathe
//!
//! # Reference, then run a program once
//! cnc_server --reference --program part.nc -v
//! ```

use clap::Parser;
use cnc_common::prelude::{LogLevel, ServerConfig};
use cnc_server::{AddressSpace, CncServer, SystemClock, UiMirror, Variant, method_paths};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// CNC Server - G-code driven motion telemetry for the turning concept
#[derive(Parser, Debug)]
#[command(name = "cnc_server")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "G-code driven motion telemetry server for the CNC turning concept")]
#[command(long_about = None)]
struct Args {
    /// Path to server configuration file (cnc_server.toml). Defaults apply when absent.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the server endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Override the namespace URI
    #[arg(long)]
    uri: Option<String>,

    /// G-code program executed once after start
    #[arg(short, long, value_name = "FILE")]
    program: Option<PathBuf>,

    /// Reference the machine after start (before the program)
    #[arg(short, long)]
    reference: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run().await {
        error!("CNC server failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args);
    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);
    let config = config?;

    info!("CNC Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let program = args.program.as_ref().map(std::fs::read_to_string).transpose()?;

    let space = Arc::new(AddressSpace::new());
    let mirror = Arc::new(UiMirror::new());
    let mut server = CncServer::new(config.clone(), space.clone(), Arc::new(SystemClock))?;
    server.add_observer(mirror.clone());
    server.start()?;

    let job = tokio::spawn(startup_job(Arc::clone(&space), args.reference, program));

    let mut refresh = interval(config.timing.ui_refresh());
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            res = signal::ctrl_c() => {
                match res {
                    Ok(()) => info!("Received shutdown signal (Ctrl+C)"),
                    Err(err) => error!("Unable to listen for shutdown signal: {}", err),
                }
                break;
            }
            _ = refresh.tick() => {
                for line in mirror.render() {
                    debug!("{}", line);
                }
            }
        }
    }

    let stats = server.stop().await?;
    if let Err(e) = job.await {
        warn!("Startup job did not finish cleanly: {}", e);
    }

    info!(
        "Heartbeat: {} beats, {} skipped during batches",
        stats.beats, stats.skipped
    );
    info!(
        "Final telemetry: {}",
        serde_json::to_string(&server.telemetry().snapshot())?
    );
    info!("CNC Server shutdown complete");
    Ok(())
}

/// Load the configuration file (or defaults) and apply CLI overrides.
fn load_config(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(endpoint) = &args.endpoint {
        config.server.endpoint = endpoint.clone();
    }
    if let Some(uri) = &args.uri {
        config.server.namespace_uri = uri.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Reference and/or run the startup program through the remote methods.
async fn startup_job(space: Arc<AddressSpace>, reference: bool, program: Option<String>) {
    let paths = method_paths();

    if reference {
        match space.call(&paths.reference, Vec::new()).await {
            Ok(result) => info!("Reference result: {:?}", result),
            Err(e) => warn!("Reference call failed: {}", e),
        }
    }

    if let Some(text) = program {
        match space.call(&paths.run_g_code, vec![Variant::from(text)]).await {
            Ok(result) => info!("Program result: {:?}", result),
            Err(e) => warn!("Program call failed: {}", e),
        }
    }
}

/// Setup tracing subscriber based on CLI arguments and configured level.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        log_level
    };

    // RUST_LOG wins over the configured level.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
