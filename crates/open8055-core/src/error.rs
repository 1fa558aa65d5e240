use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Argument errors
    #[error("invalid {kind} port {port}")]
    InvalidPort { kind: &'static str, port: i64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("port {port} is not configured for {required}")]
    WrongPortMode { port: usize, required: &'static str },

    // Client protocol errors
    #[error("usage: {usage}")]
    SyntaxError { usage: &'static str },

    #[error("command not recognized: {0}")]
    UnknownCommand(String),

    #[error("command line exceeds {limit} bytes")]
    CommandTooLong { limit: usize },

    #[error("more than {limit} commands pending")]
    TooManyPending { limit: usize },

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("authentication failed")]
    AuthenticationFailed,

    // Device errors
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("device protocol error: {0}")]
    DeviceProtocolError(String),

    #[error("operation cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a session must be closed after reporting this error.
    #[must_use]
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            Error::CommandTooLong { .. } | Error::TooManyPending { .. } | Error::Io(_)
        )
    }

    pub fn device_unavailable(reason: impl Into<String>) -> Self {
        Error::DeviceUnavailable(reason.into())
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = Error::InvalidPort {
            kind: "output",
            port: 9,
        };
        assert_eq!(err.to_string(), "invalid output port 9");

        let err = Error::SyntaxError {
            usage: "Wait <milliseconds>",
        };
        assert_eq!(err.to_string(), "usage: Wait <milliseconds>");

        let err = Error::UnknownCommand("Frobnicate 1".into());
        assert_eq!(err.to_string(), "command not recognized: Frobnicate 1");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::CommandTooLong { limit: 256 }.is_fatal_to_session());
        assert!(Error::TooManyPending { limit: 64 }.is_fatal_to_session());
        assert!(!Error::device_unavailable("unplugged").is_fatal_to_session());
        assert!(!Error::Cancelled.is_fatal_to_session());
    }
}
