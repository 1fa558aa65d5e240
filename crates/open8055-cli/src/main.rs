//! `open8055server`: share one Open8055 card between TCP clients.
//!
//! # Usage
//!
//! ```text
//! open8055server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>          TOML configuration file
//!       --bind <ADDR>            Address to listen on [default: 0.0.0.0]
//!   -p, --port <PORT>            TCP port [default: 8055]
//!       --password <PASSWORD>    Require `Login` with this password
//!       --transport <KIND>       mock | usb [default: usb]
//!       --card <N>               Card address 0-3 [default: 0]
//!       --max-connections <N>    Session limit [default: 64]
//!       --log-level <FILTER>     tracing filter [default: info]
//! ```
//!
//! `RUST_LOG` overrides the configured log level.

mod config;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use open8055_hardware::{AnyCardTransport, CardManager, mock::MockCard};
use open8055_network::{ServerContext, TcpServer};
use open8055_protocol::ConfigReport;

use crate::config::{Overrides, ServerConfig, TransportKind};

/// Open8055 card server.
///
/// Accepts text-protocol clients over TCP and arbitrates their access to a
/// single Open8055 USB I/O card.
#[derive(Debug, Parser)]
#[command(name = "open8055server", version)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, value_name = "ADDR")]
    bind: Option<IpAddr>,

    /// TCP port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Require clients to `Login` with this password.
    #[arg(long)]
    password: Option<String>,

    /// Card transport.
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Card address (0-3).
    #[arg(long, value_name = "N")]
    card: Option<u8>,

    /// Maximum number of simultaneous clients.
    #[arg(long, value_name = "N")]
    max_connections: Option<usize>,

    /// Log filter, e.g. `debug` or `info,open8055_hardware=trace`.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            bind: self.bind,
            port: self.port,
            password: self.password.clone(),
            transport: self.transport,
            card: self.card,
            max_connections: self.max_connections,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    config.apply(args.overrides());
    config.validate()?;

    init_logging(&config.logging.level)?;
    info!(version = open8055_core::VERSION, "open8055server starting");

    let transport = open_transport(&config)?;
    let runtime = CardManager::new(transport, config.card_config()).start();

    let mut context = ServerContext::new(runtime.handle());
    if let Some(password) = &config.server.password {
        context = context.with_password(password.clone());
    }
    let mut server = TcpServer::bind(config.tcp_server_config(), context)
        .await
        .context("cannot start TCP server")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let result = server.run(shutdown).await;
    runtime.shutdown().await;
    result.context("TCP server failed")?;

    info!("open8055server stopped");
    Ok(())
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

fn open_transport(config: &ServerConfig) -> anyhow::Result<AnyCardTransport> {
    let address = config.card_address()?;

    match config.card.transport {
        TransportKind::Mock => {
            warn!("using the simulated card");
            let (card, _handle) = MockCard::with_config(ConfigReport {
                card_address: address.as_u8(),
                ..Default::default()
            });
            Ok(card.into())
        }
        #[cfg(feature = "hardware-usb")]
        TransportKind::Usb => {
            let card = open8055_hardware::hid::HidCard::open(address)
                .with_context(|| format!("cannot open card{address}"))?;
            Ok(card.into())
        }
        #[cfg(not(feature = "hardware-usb"))]
        TransportKind::Usb => {
            anyhow::bail!("USB support not compiled in; rebuild with --features hardware-usb or use --transport mock")
        }
    }
}

async fn wait_for_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(e) => warn!(error = %e, "cannot listen for interrupt"),
    }
    shutdown.cancel();
}
