//! Probe server entry point.

use std::net::SocketAddr;
use std::time::Instant;

use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use probe_server::api::AppState;
use probe_server::config::Config;
use probe_server::metrics;
use probe_server::probe::Probe;
use probe_server::server::{serve_until_signal, Server};

/// Minimal HTTP service answering `GET /` with 200.
#[derive(Parser, Debug)]
#[command(name = "probe-server")]
#[command(about = "Serve a root status endpoint or probe a running instance")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Bind address.
    #[arg(long)]
    host: Option<String>,

    /// HTTP server port (0 = ephemeral).
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve until Ctrl-C or SIGTERM (default).
    Serve {
        /// Bind address.
        #[arg(long)]
        host: Option<String>,

        /// HTTP server port (0 = ephemeral).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// GET a path on a running instance and check the status.
    Probe {
        /// Base URL of the instance (defaults to PROBE_URL).
        #[arg(long)]
        url: Option<String>,

        /// Path to request.
        #[arg(long, default_value = "/")]
        path: String,

        /// Expected status code.
        #[arg(long, default_value = "200")]
        expect: u16,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Bind an ephemeral port, probe `/`, shut down and verify the port is free.
    SelfTest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging. Load errors resurface once the command loads config.
    let settings = Config::load().unwrap_or_default();
    let filter = EnvFilter::try_new(settings.log_filter(args.verbose))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (json_layer, text_layer) = if args.json_logs {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .init();

    // Initialize metrics
    metrics::init_metrics();

    match args.command {
        Some(Command::Serve { host, port }) => cmd_serve(host, port).await,
        Some(Command::Probe { url, path, expect }) => cmd_probe(url, path, expect).await,
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::SelfTest) => cmd_self_test().await,
        None => cmd_serve(args.host, args.port).await,
    }
}

/// Load and validate configuration, logging failures.
fn load_config() -> anyhow::Result<Config> {
    Config::load_validated().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e.into()
    })
}

/// Serve the API until a shutdown signal arrives.
async fn cmd_serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = load_config()?;

    // Override with CLI args if provided
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let addr: SocketAddr = config
        .socket_addr()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    let mut state = AppState::new();
    match metrics::install_prometheus() {
        Ok(handle) => state = state.with_prometheus(handle),
        Err(e) => warn!("Prometheus recorder not installed: {}", e),
    }

    serve_until_signal(addr, state, config.shutdown_timeout()).await?;
    info!("Shutdown complete");

    Ok(())
}

/// Probe a running instance.
async fn cmd_probe(url: Option<String>, path: String, expect: u16) -> anyhow::Result<()> {
    let config = load_config()?;
    let base = url.unwrap_or_else(|| config.probe_url.clone());
    let expected = StatusCode::from_u16(expect)?;

    let probe = Probe::new(&base, config.probe_timeout())?;
    let start = Instant::now();

    match probe.expect_status(&path, expected).await {
        Ok(status) => {
            println!(
                "OK   GET {} -> {} ({:.1}ms)",
                probe.url_for(&path)?,
                status,
                start.elapsed().as_secs_f64() * 1000.0
            );
            Ok(())
        }
        Err(e) => {
            println!("FAIL {}", e);
            Err(e.into())
        }
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("PROBE SERVER - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Bind Address: {}:{}", config.host, config.port);
    if config.port == 0 {
        println!("  (port 0: an ephemeral port is chosen at bind time)");
    }
    println!("  Shutdown Timeout: {}s", config.shutdown_timeout_secs);
    println!("  Probe URL: {}", config.probe_url);
    println!("  Probe Timeout: {}s", config.probe_timeout_secs);
    println!("  Log Level: {}", config.rust_log);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run the full bind/probe/shutdown cycle against an ephemeral port.
async fn cmd_self_test() -> anyhow::Result<()> {
    let config = load_config()?;
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));

    let running = Server::bind(addr).await?.spawn(AppState::new());
    let bound = running.local_addr();
    println!("Listening on {}", bound);

    let probe = Probe::new(&running.base_url(), config.probe_timeout())?;
    let result = probe.expect_status("/", StatusCode::OK).await;

    // Release the port before reporting, whatever the probe said.
    running.shutdown(config.shutdown_timeout()).await?;

    match result {
        Ok(status) => println!("GET / -> {}", status),
        Err(e) => {
            println!("FAIL {}", e);
            return Err(e.into());
        }
    }

    Server::bind(bound).await.map_err(|e| {
        error!("Port {} still bound after shutdown: {}", bound.port(), e);
        e
    })?;
    println!("Port {} released", bound.port());
    println!("SELF-TEST PASSED");

    Ok(())
}
