//! PHANTOM fleet orchestrator CLI
//!
//! Spins up fleets of simulated devices against a Particle-style local
//! cloud server: each device performs the real RSA handshake, speaks
//! CoAP over the framed AES-CBC pipeline, answers functions, variables,
//! and describes, and optionally fires webhook events on an interval.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use config::Config;
use phantom_core::device::{DeviceFleet, DeviceIdentity, SessionConfig};
use phantom_crypto::ServerPublicKey;

/// PHANTOM - virtual device fleets for cloud load testing
#[derive(Parser)]
#[command(name = "phantom")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a device fleet against the cloud server
    Run {
        /// Number of devices (overrides the config file)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Server address (overrides the config file)
        #[arg(short, long)]
        server: Option<String>,

        /// Artificial network delay per chunk, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Send a fleet-wide webhook burst every N milliseconds
        #[arg(long)]
        webhook_every_ms: Option<u64>,
    },

    /// Generate a device identity into the keys directory
    Keygen {
        /// Fixed 24-hex-character device id (random when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Print the effective configuration
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    // Verbosity flags override the configured level
    let log_level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Run {
            count,
            server,
            delay_ms,
            webhook_every_ms,
        } => {
            let mut config = config;
            if let Some(count) = count {
                config.fleet.device_count = count;
            }
            if let Some(server) = server {
                config.server.address = server;
            }
            if let Some(delay_ms) = delay_ms {
                config.fleet.network_delay_ms = delay_ms;
            }
            if let Some(interval) = webhook_every_ms {
                config.fleet.webhook_interval_ms = Some(interval);
            }
            config.validate()?;
            run_fleet(config).await
        }
        Commands::Keygen { id } => keygen(&config, id.as_deref()),
        Commands::Info => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Build, connect, and babysit the fleet until ctrl-c.
async fn run_fleet(config: Config) -> anyhow::Result<()> {
    let pem = std::fs::read_to_string(&config.server.public_key_file).map_err(|e| {
        anyhow::anyhow!(
            "failed to read server public key {}: {e}",
            config.server.public_key_file.display()
        )
    })?;
    let server_key = Arc::new(ServerPublicKey::from_public_key_pem(&pem)?);

    let session_config = SessionConfig {
        server_addr: config.server.address.clone(),
        network_delay: Duration::from_millis(config.fleet.network_delay_ms),
        webhook_event: config.fleet.webhook_event.clone(),
        ..SessionConfig::default()
    };

    let mut fleet = DeviceFleet::new(server_key, &config.fleet.keys_dir, session_config);
    for _ in 0..config.fleet.device_count {
        fleet.spawn_device(None)?;
    }

    tracing::info!(
        devices = fleet.len(),
        server = %config.server.address,
        "fleet starting"
    );
    fleet.connect_all();

    let fleet = Arc::new(fleet);
    let webhook_task = config.fleet.webhook_interval_ms.map(|interval_ms| {
        let fleet = Arc::clone(&fleet);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            loop {
                ticker.tick().await;
                let sent = fleet.send_webhook_all().await;
                tracing::debug!(sent, "webhook burst");
            }
        })
    });

    // Periodic status line while the fleet runs
    let status_fleet = Arc::clone(&fleet);
    let status_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let connected = status_fleet.connected_count().await;
            tracing::info!(
                connected,
                total = status_fleet.len(),
                "fleet status"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down fleet");

    if let Some(task) = webhook_task {
        task.abort();
    }
    status_task.abort();
    fleet.disconnect_all().await;

    let stats = fleet.total_stats();
    println!(
        "fleet summary: {} connects, {} messages sent ({} bytes), {} messages received ({} bytes), {} dropped writes",
        stats.connects,
        stats.messages_sent,
        stats.bytes_sent,
        stats.messages_received,
        stats.bytes_received,
        stats.send_errors,
    );
    Ok(())
}

/// Generate (or load) a device identity and print its registration data.
fn keygen(config: &Config, hex_id: Option<&str>) -> anyhow::Result<()> {
    let id = hex_id
        .map(DeviceIdentity::parse_hex_id)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid device id: {e}"))?;

    let identity = DeviceIdentity::load_or_generate(&config.fleet.keys_dir, id)
        .map_err(|e| anyhow::anyhow!("key generation failed: {e}"))?;

    println!("device id: {}", identity.id_hex());
    println!(
        "key file:  {}",
        DeviceIdentity::key_path(&config.fleet.keys_dir, identity.id()).display()
    );
    println!("{}", identity.public_key_pem()?);
    Ok(())
}
