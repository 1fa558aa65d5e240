//! Types shared by the card transports.

use serde::{Deserialize, Serialize};

use open8055_core::CardAddress;

/// Identification of an attached card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human readable name (e.g. "Open8055 card0").
    pub name: String,

    /// Card address selected by the jumpers.
    pub address: CardAddress,

    /// USB vendor/product id, when the card sits on a real bus.
    pub usb_id: Option<(u16, u16)>,

    /// Optional serial number string.
    pub serial_number: Option<String>,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, address: CardAddress) -> Self {
        Self {
            name: name.into(),
            address,
            usb_id: None,
            serial_number: None,
        }
    }

    pub fn with_usb_id(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.usb_id = Some((vendor_id, product_id));
        self
    }

    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_builder() {
        let info = DeviceInfo::new("Open8055 card1", CardAddress::new(1).unwrap())
            .with_usb_id(0x10cf, 0x55f1)
            .with_serial_number("A1");
        assert_eq!(info.usb_id, Some((0x10cf, 0x55f1)));

        let json = serde_json::to_string(&info).unwrap();
        let back: DeviceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
