//! Input-method server entry point.
//!
//! Wires the broker to its transport and starts the Tokio runtime. The
//! binary is headless: framework notifications go to a logging target.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, init tracing
//!  └─ TransportListener::start()    -- private socket (fatal on failure)
//!  └─ activation::advertise()       -- session bus (warning on failure)
//!  └─ start tasks
//!       ├─ InputContextBroker::run  (single owner of connection state)
//!       └─ accept loop              (one socket task per input context)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use imserver::application::broker::{BrokerHandle, InputContextBroker};
use imserver::application::targets::TargetList;
use imserver::infrastructure::logging_target::{LoggingHost, LoggingTarget};
use imserver::infrastructure::network::activation;
use imserver::infrastructure::network::listener::TransportListener;
use imserver::infrastructure::storage::config::{
    load_config, load_config_from, save_config_to, ConfigError, ServerConfig,
};
use imserver::infrastructure::toolbar_registry::InMemoryToolbarRegistry;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Input-method server.
///
/// Accepts input-context connections from applications on a private Unix
/// socket and advertises its address on the session bus.
#[derive(Debug, Parser)]
#[command(name = "imserver", about = "Input-method server connection broker", version)]
struct Cli {
    /// Configuration file to read instead of the default location.
    #[arg(long, env = "IMSERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory in which the private socket directory is created.
    #[arg(long, env = "IMSERVER_SOCKET_DIR")]
    socket_dir: Option<PathBuf>,

    /// Do not advertise the socket address on the session bus.
    #[arg(long, env = "IMSERVER_NO_ACTIVATION")]
    no_activation: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "IMSERVER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write the effective configuration to this path and exit.
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(dir) = &self.socket_dir {
            config.transport.socket_dir = Some(dir.clone());
        }
        if self.no_activation {
            config.activation.enabled = false;
        }
        if let Some(level) = &self.log_level {
            config.server.log_level = level.clone();
        }
    }

    fn load_config(&self) -> Result<ServerConfig, ConfigError> {
        let loaded = match &self.config {
            Some(path) => load_config_from(path),
            None => load_config(),
        };
        match loaded {
            Err(ConfigError::NoPlatformConfigDir) => Ok(ServerConfig::default()),
            other => other,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = cli.load_config().context("failed to load configuration")?;
    cli.apply(&mut config);

    if let Some(path) = &cli.write_config {
        save_config_to(path, &config)
            .with_context(|| format!("failed to write configuration to {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    info!("input-method server starting");

    // ── Transport ─────────────────────────────────────────────────────────────
    let mut listener = TransportListener::start(&config.transport)
        .context("cannot open the input context socket")?;
    let address = listener.address();

    // ── Broker ────────────────────────────────────────────────────────────────
    let targets = TargetList::new();
    targets.add(Arc::new(LoggingTarget));
    let broker = InputContextBroker::new(
        Arc::new(InMemoryToolbarRegistry::new()),
        targets,
        Arc::new(LoggingHost),
        config.transport.preedit_query_timeout(),
    );
    let (events_tx, events_rx) = mpsc::channel(config.transport.event_queue_capacity.max(1));
    let handle = BrokerHandle::new(events_tx);
    let broker_task = tokio::spawn(broker.run(events_rx));

    listener
        .spawn_accept_loop(handle.event_sender())
        .context("cannot start accepting input contexts")?;

    // ── Discovery ─────────────────────────────────────────────────────────────
    let _activation = if config.activation.enabled {
        match activation::advertise(&config.activation, &address).await {
            Ok(guard) => {
                info!(
                    "activation service exported as {}",
                    guard.unique_name().unwrap_or_default()
                );
                Some(guard)
            }
            Err(e) => {
                warn!("{e}; clients must be given {address} directly");
                None
            }
        }
    } else {
        info!("activation disabled; address is {address}");
        None
    };

    info!("input-method server ready.  Press Ctrl-C to exit.");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!("failed to listen for Ctrl-C signal: {e}"),
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    listener.stop().await;
    handle.shutdown().await;
    if let Err(e) = broker_task.await {
        error!("broker task ended abnormally: {e}");
    }

    info!("input-method server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
