//! Transport abstraction for the Open8055 card.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! so they are not object-safe; see [`crate::devices::AnyCardTransport`] for
//! the enum used where a concrete type is needed.

#![allow(async_fn_in_trait)]

use open8055_core::CardAddress;
use open8055_protocol::Report;

use crate::{DeviceInfo, Result};

/// Send/receive primitive for one card.
///
/// A transport moves whole 32-byte reports; it knows nothing about what
/// they mean. Exactly one task owns a transport at a time.
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// opaque futures. Use generics or [`crate::devices::AnyCardTransport`].
///
/// # Examples
///
/// ```
/// use open8055_hardware::traits::CardTransport;
/// use open8055_hardware::mock::MockCard;
/// use open8055_protocol::Report;
///
/// #[tokio::main]
/// async fn main() -> open8055_hardware::Result<()> {
///     let (mut card, _handle) = MockCard::new();
///
///     card.send_report(&Report::GetInput).await?;
///     let reply = card.recv_report().await?;
///     assert!(matches!(reply, Report::Input(_)));
///     Ok(())
/// }
/// ```
pub trait CardTransport: Send {
    /// Transmit one report to the card.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Disconnected` if the card is gone, or
    /// `HardwareError::CommunicationError` if the transfer failed.
    async fn send_report(&mut self, report: &Report) -> Result<()>;

    /// Wait for the next report from the card.
    ///
    /// Must be cancel-safe: dropping the future before it completes loses
    /// no report.
    ///
    /// # Errors
    ///
    /// `HardwareError::InvalidData` for an undecodable report (the caller
    /// may keep receiving), `HardwareError::Disconnected` once the card is
    /// gone for good.
    async fn recv_report(&mut self) -> Result<Report>;

    /// Whether a card with `address` is attached to this host.
    async fn card_present(&self, address: CardAddress) -> Result<bool>;

    /// Identification of the card behind this transport.
    async fn get_info(&self) -> Result<DeviceInfo>;
}
