//! Card access layer for the Open8055 server.
//!
//! This crate owns everything between the TCP sessions and the USB card:
//! the transport abstraction, the card state cache, the software debounce
//! and the wait/notify hub used by `WaitFor`.
//!
//! # Architecture
//!
//! Exactly one task, the card owner started by [`CardManager`], talks to
//! the transport. Sessions get a cloneable [`CardHandle`]:
//!
//! - **Reads** are answered from the latest [`CardState`] snapshot without
//!   touching the card.
//! - **Writes** are sent to the owner and applied in arrival order, each one
//!   as a whole, so concurrent clients never see a torn output report.
//! - **Waits** register with the [`WaitHub`] and wake on the first matching
//!   input change, a timeout, or cancellation of the session.
//!
//! # Transports
//!
//! The [`CardTransport`] trait uses native `async fn` (Rust 1.90 + Edition
//! 2024 RPITIT). Implementations:
//!
//! - [`mock::MockCard`]: in-process board for tests and development.
//! - `hid::HidCard`: real hardware through hidapi, behind the
//!   `hardware-usb` feature.
//!
//! ```
//! use open8055_hardware::{CardConfig, CardManager, mock::MockCard};
//! use open8055_core::{InputMask, WaitTimeout};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> open8055_core::Result<()> {
//!     let (card, mock) = MockCard::new();
//!     let runtime = CardManager::new(card.into(), CardConfig::default()).start();
//!     let handle = runtime.handle();
//!     handle.wait_connected().await?;
//!
//!     let waiter = {
//!         let handle = handle.clone();
//!         tokio::spawn(async move {
//!             handle
//!                 .wait_for(InputMask::ANY, WaitTimeout::Infinite, &CancellationToken::new())
//!                 .await
//!         })
//!     };
//!     while handle.waiter_count() == 0 {
//!         tokio::task::yield_now().await;
//!     }
//!     mock.set_adc(0, 512);
//!
//!     let outcome = waiter.await.expect("waiter panicked")?;
//!     assert!(!outcome.timed_out());
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Transport code returns [`HardwareError`]; the card owner converts it to
//! [`open8055_core::Error`] before it reaches a session.

pub mod card;
pub mod debounce;
pub mod devices;
pub mod error;
#[cfg(feature = "hardware-usb")]
pub mod hid;
pub mod manager;
pub mod mock;
pub mod notify;
pub mod state;
pub mod traits;
pub mod types;

pub use card::{CardHandle, CardOp};
pub use devices::AnyCardTransport;
pub use error::{HardwareError, Result};
pub use manager::{CardConfig, CardManager, CardRuntime};
pub use notify::{InputChange, WaitHub, WaitOutcome};
pub use state::{CardState, Outputs};
pub use traits::CardTransport;
pub use types::DeviceInfo;
