//! Network layer of the Open8055 server.
//!
//! Clients speak a line-oriented text protocol over TCP. Every connection
//! becomes a session with its own reader and executor loop; all sessions
//! share the card through one [`open8055_hardware::CardHandle`].
//!
//! # Components
//!
//! - **TcpServer**: accept loop, connection limit, periodic reaping
//! - **Session**: per-connection actor
//! - **SessionRegistry**: live sessions, reap and shutdown
//! - **Interpreter**: command line to card operation to reply
//!
//! # Example
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
//! let config = TcpServerConfig {
//!     bind_addr: "127.0.0.1:8055".parse()?,
//!     ..Default::default()
//! };
//! let context = ServerContext::new(runtime.handle()).with_password("secret");
//! let mut server = TcpServer::bind(config, context).await?;
//!
//! let shutdown = CancellationToken::new();
//! server.run(shutdown).await?;
//! # Ok(())
//! # }
//! ```

pub mod interpreter;
pub mod registry;
pub mod server;
pub mod session;

pub use interpreter::{Action, Interpreter, SessionContext};
pub use registry::SessionRegistry;
pub use server::{ServerContext, TcpServer, TcpServerConfig, TcpServerError};
pub use session::{Session, SessionId, SessionInfo, SessionMode};
