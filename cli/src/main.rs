//! Charge coordinator CLI server
//!
//! Headless port allocation and session service, suitable for deployment
//! as a systemd service, Docker container, or standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/charge-coordinator/config.toml)
//! charge-coordinator
//!
//! # Custom config path
//! charge-coordinator --config /etc/charge-coordinator/config.toml
//!
//! # Override the API port
//! charge-coordinator --api-port 8080
//!
//! # Validate config without starting
//! charge-coordinator --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use charge_coordinator::config::AppConfig;
use charge_coordinator::server::{init_tracing, ServerHandle, ServerOptions};

/// Charge coordinator: charging session and port allocation for EV fleets.
#[derive(Parser, Debug)]
#[command(
    name = "charge-coordinator",
    version,
    about = "Charging session and port allocation service",
    long_about = "REST API and event stream server that allocates charging ports \
                  and tracks charging sessions.\n\n\
                  Default config: ~/.config/charge-coordinator/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "CHARGE_COORDINATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Override the REST API listen port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .unwrap_or_else(charge_coordinator::default_config_path);

    // CLI log level wins over the file, so apply it before tracing starts.
    let loaded = AppConfig::load(&config_path).map(|mut cfg| {
        if let Some(ref level) = cli.log_level {
            cfg.logging.level = level.clone();
        }
        cfg
    });

    let mut config = match loaded {
        Ok(cfg) => {
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            if cli.check {
                eprintln!("❌ Configuration is invalid: {}", e);
                std::process::exit(1);
            }
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(
                    cli.log_level.as_deref().unwrap_or("info"),
                ))
                .init();
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
            AppConfig::default()
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.api_port {
        info!("CLI override: api_port = {}", port);
        config.server.api_port = port;
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        if let Err(e) = config.validate() {
            eprintln!("❌ Configuration is invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        println!("   Config file       : {}", config_path.display());
        println!("   API address       : {}:{}", config.server.api_host, config.server.api_port);
        println!("   Database          : {}", config.database.connection_url());
        println!("   Log level         : {}", config.logging.level);
        println!(
            "   Grace periods     : reserved {}s, completing {}s",
            config.allocation.reservation_grace_secs, config.allocation.completion_grace_secs
        );
        println!(
            "   Watchdog          : {} (every {}s)",
            if config.watchdog.enabled { "enabled" } else { "disabled" },
            config.watchdog.check_interval_secs
        );
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
    })
    .await?;

    handle.install_signal_handler();

    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
