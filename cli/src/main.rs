//! OCPP central system CLI server
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-csms/config.toml)
//! csms-service
//!
//! # Custom config path
//! csms-service --config /etc/ocpp-csms/config.toml
//!
//! # Override the WebSocket port
//! csms-service --port 9100
//!
//! # Validate config without starting
//! csms-service --check
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use ocpp_csms::config::AppConfig;
use ocpp_csms::server::{init_tracing, ServerHandle};

/// OCPP 1.6-J central system for EV charging stations.
#[derive(Parser, Debug)]
#[command(
    name = "csms-service",
    version,
    about = "OCPP 1.6-J central system with site load balancing",
    long_about = "WebSocket server for managing EV charging stations via OCPP 1.6-J.\n\n\
                  Default config: ~/.config/ocpp-csms/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the WebSocket listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = AppConfig::resolve_path(cli.config.as_deref());
    let mut config = match AppConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    if cli.check {
        println!("Configuration is valid");
        match &config_path {
            Some(path) if path.exists() => println!("   Config file   : {}", path.display()),
            _ => println!("   Config file   : (defaults)"),
        }
        println!("   WS address    : {}", config.address());
        println!("   Subprotocols  : {:?}", config.ocpp.subprotocols);
        println!("   Locations     : {}", config.locations.len());
        println!("   Charge points : {}", config.charge_points.len());
        println!("   Log level     : {}", config.logging.level);
        return ExitCode::SUCCESS;
    }

    init_tracing(&config.logging);
    match &config_path {
        Some(path) if path.exists() => info!(path = %path.display(), "Configuration loaded"),
        _ => info!("No configuration file found, using defaults"),
    }

    let handle = match ServerHandle::start(config).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start");
            return ExitCode::FAILURE;
        }
    };

    handle.install_signal_handler();
    info!("Press Ctrl+C to shut down gracefully.");

    handle.shutdown_signal().wait().await;
    handle.wait().await;

    ExitCode::SUCCESS
}
