//! TCP server for the Open8055 text protocol.
//!
//! The server accepts any number of clients (up to `max_connections`) and
//! gives each one a [`Session`](crate::session::Session) that shares the
//! single card through a [`CardHandle`].
//!
//! # Architecture
//!
//! ```text
//! Client 1 ┐
//!          │                 ┌─► Session ─┐
//! Client 2 ├──> TcpServer ───┼─► Session ─┼──► CardHandle ──► card owner
//!          │   (accept loop) └─► Session ─┘
//! Client n ┘        │
//!                   └──> SessionRegistry (reap / shutdown)
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use open8055_hardware::{CardConfig, CardManager, mock::MockCard};
//! use open8055_network::{ServerContext, TcpServer, TcpServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (card, _mock) = MockCard::new();
//! let runtime = CardManager::new(card.into(), CardConfig::default()).start();
//!
//! let context = ServerContext::new(runtime.handle());
//! let mut server = TcpServer::bind(TcpServerConfig::default(), context).await?;
//! server.run(CancellationToken::new()).await?;
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use open8055_core::constants::{DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT, DEFAULT_REAP_INTERVAL};
use open8055_hardware::CardHandle;

use crate::interpreter::Interpreter;
use crate::registry::SessionRegistry;
use crate::session::{SessionId, SessionInfo};

/// Configuration for the TCP server
///
/// # Example
///
/// ```
/// use open8055_network::TcpServerConfig;
/// use std::time::Duration;
///
/// let config = TcpServerConfig {
///     bind_addr: "127.0.0.1:8055".parse().unwrap(),
///     max_connections: 8,
///     reap_interval: Duration::from_millis(100),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct TcpServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Maximum number of simultaneous sessions
    pub max_connections: usize,

    /// How often finished sessions are reaped
    pub reap_interval: Duration,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

/// Everything a session needs from the rest of the server.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub card: CardHandle,

    /// Password clients must `Login` with; `None` disables login.
    pub password: Option<String>,
}

impl ServerContext {
    pub fn new(card: CardHandle) -> Self {
        Self {
            card,
            password: None,
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn interpreter(&self) -> Interpreter {
        Interpreter::new(self.card.clone(), self.password.clone())
    }
}

/// Errors that can occur during TCP server operations
#[derive(Debug, Error)]
pub enum TcpServerError {
    /// Failed to bind to address
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// TCP server for Open8055 clients
///
/// # Connection Lifecycle
///
/// 1. Bind server with `bind()`
/// 2. Serve clients with `run()` until the shutdown token fires
/// 3. On shutdown every session is stopped and joined before `run()` returns
pub struct TcpServer {
    /// TCP listener for accepting new connections
    listener: TcpListener,

    /// Server configuration
    config: TcpServerConfig,

    context: ServerContext,

    /// Live sessions
    registry: Arc<Mutex<SessionRegistry>>,
}

impl TcpServer {
    /// Bind the server to the configured address
    ///
    /// # Errors
    ///
    /// Returns `TcpServerError::BindFailed` if the address is in use, not
    /// permitted, or otherwise unavailable.
    pub async fn bind(config: TcpServerConfig, context: ServerContext) -> Result<Self, TcpServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| TcpServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;

        info!(
            addr = %listener.local_addr()?,
            max_connections = config.max_connections,
            login_required = context.password.is_some(),
            "TCP server listening"
        );

        Ok(Self {
            listener,
            config,
            context,
            registry: Arc::new(Mutex::new(SessionRegistry::new(CancellationToken::new()))),
        })
    }

    /// Get the local address the server is bound to
    ///
    /// This is useful for tests that bind to port 0 (OS-assigned random port).
    pub fn local_addr(&self) -> Result<SocketAddr, TcpServerError> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// Shared view of the session registry, for monitoring.
    pub fn registry(&self) -> Arc<Mutex<SessionRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Snapshots of all registered sessions.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.lock().await.sessions()
    }

    /// Accept connections until `shutdown` fires, then stop every session.
    ///
    /// Failures of a single connection are logged and do not end the loop.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listener itself fails.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), TcpServerError> {
        let mut reap = tokio::time::interval(self.config.reap_interval);
        reap.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break Ok(()),

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.admit(stream, peer).await;
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!(error = %e, "accept failed");
                    }
                    Err(e) => {
                        error!(error = %e, "listener failed");
                        break Err(TcpServerError::Io(e));
                    }
                },

                _ = reap.tick() => {
                    self.registry.lock().await.reap().await;
                }
            }
        };

        self.shutdown().await;
        result
    }

    /// Stop all sessions and wait for them.
    pub async fn shutdown(&mut self) {
        self.registry.lock().await.shutdown().await;
        info!("TCP server stopped");
    }

    /// Register an accepted connection, or turn it away when full.
    async fn admit(&mut self, mut stream: TcpStream, peer: SocketAddr) -> Option<SessionId> {
        let mut registry = self.registry.lock().await;
        registry.reap().await;

        if registry.len() >= self.config.max_connections {
            warn!(
                %peer,
                max_connections = self.config.max_connections,
                "Connection rejected: maximum connections reached"
            );
            // Best effort; the client may already be gone
            let _ = stream.write_all(b"ERROR too many connections\n").await;
            let _ = stream.shutdown().await;
            return None;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }

        let id = registry.spawn(stream, peer, self.context.interpreter());
        info!(session_id = %id, %peer, total = registry.len(), "client connected");
        Some(id)
    }
}

/// Accept errors that concern only the connection being accepted.
fn is_transient_accept_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use open8055_hardware::{CardConfig, CardManager, mock::MockCard};

    #[test]
    fn test_config_default() {
        let config = TcpServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8055);
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.reap_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_transient_accept_errors() {
        use std::io::{Error, ErrorKind};
        assert!(is_transient_accept_error(&Error::from(ErrorKind::ConnectionAborted)));
        assert!(!is_transient_accept_error(&Error::from(ErrorKind::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_server_bind() {
        let (card, _mock) = MockCard::new();
        let runtime = CardManager::new(card.into(), CardConfig::default()).start();
        let config = TcpServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };

        let server = TcpServer::bind(config, ServerContext::new(runtime.handle()))
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert!(server.sessions().await.is_empty());

        // Binding the same port again fails
        let taken = TcpServerConfig {
            bind_addr: server.local_addr().unwrap(),
            ..Default::default()
        };
        let err = TcpServer::bind(taken, ServerContext::new(runtime.handle()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TcpServerError::BindFailed { .. }));
        runtime.shutdown().await;
    }
}
