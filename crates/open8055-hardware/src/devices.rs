//! Enum wrapper for card transport dispatch.
//!
//! Native `async fn` in traits (RPITIT) is not object-safe, so the card
//! owner holds an [`AnyCardTransport`] instead of `Box<dyn CardTransport>`.
//! Real hardware variants are compiled in behind cargo features.
//!
//! # Examples
//!
//! ```
//! use open8055_hardware::devices::AnyCardTransport;
//! use open8055_hardware::mock::MockCard;
//!
//! let (card, _handle) = MockCard::new();
//! let transport = AnyCardTransport::Mock(card);
//! assert_eq!(transport.kind(), "mock");
//! ```

#[cfg(feature = "hardware-usb")]
use crate::hid::HidCard;
use crate::mock::MockCard;
use crate::traits::CardTransport;
use crate::{DeviceInfo, Result};
use open8055_core::CardAddress;
use open8055_protocol::Report;

/// Any supported card transport.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyCardTransport {
    /// In-process simulated card.
    Mock(MockCard),

    /// Board attached over USB HID.
    #[cfg(feature = "hardware-usb")]
    Hid(HidCard),
}

impl AnyCardTransport {
    /// Short name of the transport kind, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mock(_) => "mock",
            #[cfg(feature = "hardware-usb")]
            Self::Hid(_) => "usb",
        }
    }
}

impl From<MockCard> for AnyCardTransport {
    fn from(card: MockCard) -> Self {
        Self::Mock(card)
    }
}

#[cfg(feature = "hardware-usb")]
impl From<HidCard> for AnyCardTransport {
    fn from(card: HidCard) -> Self {
        Self::Hid(card)
    }
}

impl CardTransport for AnyCardTransport {
    async fn send_report(&mut self, report: &Report) -> Result<()> {
        match self {
            Self::Mock(device) => device.send_report(report).await,
            #[cfg(feature = "hardware-usb")]
            Self::Hid(device) => device.send_report(report).await,
        }
    }

    async fn recv_report(&mut self) -> Result<Report> {
        match self {
            Self::Mock(device) => device.recv_report().await,
            #[cfg(feature = "hardware-usb")]
            Self::Hid(device) => device.recv_report().await,
        }
    }

    async fn card_present(&self, address: CardAddress) -> Result<bool> {
        match self {
            Self::Mock(device) => device.card_present(address).await,
            #[cfg(feature = "hardware-usb")]
            Self::Hid(device) => device.card_present(address).await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
            #[cfg(feature = "hardware-usb")]
            Self::Hid(device) => device.get_info().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_transport_dispatch() {
        let (card, handle) = MockCard::new();
        let mut transport = AnyCardTransport::from(card);

        transport.send_report(&Report::GetInput).await.unwrap();
        assert!(matches!(
            transport.recv_report().await.unwrap(),
            Report::Input(_)
        ));
        assert_eq!(handle.sent_reports(), vec![Report::GetInput]);

        let info = transport.get_info().await.unwrap();
        assert_eq!(info.address, CardAddress::default());
    }
}
