//! Error types for card transport operations.
//!
//! Transport failures are reported as [`HardwareError`] and converted into
//! the server-wide [`open8055_core::Error`] taxonomy at the card boundary:
//! malformed reports become `DeviceProtocolError`, everything else becomes
//! `DeviceUnavailable`.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to an Open8055 card.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Card is not attached or was unplugged.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// The transport rejected or failed a transfer.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// The card sent something that is not a valid report.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Opening the card failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// `true` when the card is gone and the receive side will not recover.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

impl From<open8055_core::Error> for HardwareError {
    fn from(err: open8055_core::Error) -> Self {
        match err {
            open8055_core::Error::DeviceProtocolError(message) => Self::InvalidData { message },
            other => Self::CommunicationError {
                message: other.to_string(),
            },
        }
    }
}

impl From<HardwareError> for open8055_core::Error {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::InvalidData { message } => Self::DeviceProtocolError(message),
            other => Self::DeviceUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("card0");
        assert!(error.is_disconnect());
        assert_eq!(error.to_string(), "Device disconnected: card0");
    }

    #[test]
    fn test_communication_error() {
        let error = HardwareError::communication("write stalled");
        assert!(!error.is_disconnect());
        assert_eq!(error.to_string(), "Communication error: write stalled");
    }

    #[test]
    fn test_conversion_into_core() {
        let core: open8055_core::Error = HardwareError::invalid_data("short report").into();
        assert!(matches!(core, open8055_core::Error::DeviceProtocolError(_)));

        let core: open8055_core::Error = HardwareError::disconnected("card1").into();
        assert!(matches!(core, open8055_core::Error::DeviceUnavailable(_)));
        assert_eq!(
            core.to_string(),
            "device unavailable: Device disconnected: card1"
        );
    }

    #[test]
    fn test_decode_error_becomes_invalid_data() {
        let err = open8055_protocol::Report::decode(&[0u8; 3]).unwrap_err();
        let hw = HardwareError::from(err);
        assert!(matches!(hw, HardwareError::InvalidData { .. }));
    }
}
