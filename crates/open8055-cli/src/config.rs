//! Server configuration file.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8055
//! max_connections = 64
//! reap_interval_ms = 100
//! password = "secret"
//!
//! [card]
//! transport = "usb"
//! address = 0
//! auto_flush = true
//! startup_readback = true
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every key is optional. Command-line flags override the file.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use open8055_core::{
    CardAddress, Error, Result,
    constants::{DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT, DEFAULT_REAP_INTERVAL},
};
use open8055_hardware::CardConfig;
use open8055_network::TcpServerConfig;

/// Which card transport to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Simulated in-process card.
    Mock,
    /// Real board over USB HID.
    Usb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: IpAddr,
    pub port: u16,
    pub max_connections: usize,
    pub reap_interval_ms: u64,
    pub password: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            reap_interval_ms: DEFAULT_REAP_INTERVAL.as_millis() as u64,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSection {
    pub transport: TransportKind,
    pub address: u8,
    pub auto_flush: bool,
    pub startup_readback: bool,
    pub request_queue: usize,
    pub notify_capacity: usize,
}

impl Default for CardSection {
    fn default() -> Self {
        let card = CardConfig::default();
        Self {
            transport: TransportKind::Usb,
            address: 0,
            auto_flush: card.auto_flush,
            startup_readback: card.startup_readback,
            request_queue: card.request_queue,
            notify_capacity: card.notify_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Whole configuration of `open8055server`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub card: CardSection,
    pub logging: LoggingSection,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub transport: Option<TransportKind>,
    pub card: Option<u8>,
    pub max_connections: Option<usize>,
    pub log_level: Option<String>,
}

impl ServerConfig {
    /// Read and validate a TOML file.
    ///
    /// # Errors
    ///
    /// `Error::Config` if the file cannot be read, is not valid TOML, or
    /// holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        let Overrides {
            bind,
            port,
            password,
            transport,
            card,
            max_connections,
            log_level,
        } = overrides;

        if let Some(bind) = bind {
            self.server.bind = bind;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        if password.is_some() {
            self.server.password = password;
        }
        if let Some(transport) = transport {
            self.card.transport = transport;
        }
        if let Some(card) = card {
            self.card.address = card;
        }
        if let Some(max) = max_connections {
            self.server.max_connections = max;
        }
        if let Some(level) = log_level {
            self.logging.level = level;
        }
    }

    /// # Errors
    ///
    /// `Error::Config` naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.card_address()?;
        if self.server.max_connections == 0 {
            return Err(Error::Config("server.max_connections must be at least 1".into()));
        }
        if self.server.reap_interval_ms == 0 {
            return Err(Error::Config("server.reap_interval_ms must be at least 1".into()));
        }
        if self.card.request_queue == 0 || self.card.notify_capacity == 0 {
            return Err(Error::Config("card queue sizes must be at least 1".into()));
        }
        if self.server.password.as_deref() == Some("") {
            return Err(Error::Config("server.password must not be empty".into()));
        }
        Ok(())
    }

    pub fn card_address(&self) -> Result<CardAddress> {
        CardAddress::new(i64::from(self.card.address))
            .map_err(|e| Error::Config(format!("card.address: {e}")))
    }

    pub fn tcp_server_config(&self) -> TcpServerConfig {
        TcpServerConfig {
            bind_addr: SocketAddr::new(self.server.bind, self.server.port),
            max_connections: self.server.max_connections,
            reap_interval: Duration::from_millis(self.server.reap_interval_ms),
        }
    }

    pub fn card_config(&self) -> CardConfig {
        CardConfig {
            request_queue: self.card.request_queue,
            notify_capacity: self.card.notify_capacity,
            startup_readback: self.card.startup_readback,
            auto_flush: self.card.auto_flush,
        }
    }
}
