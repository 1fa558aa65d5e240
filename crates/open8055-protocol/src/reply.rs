use std::fmt;

use open8055_core::Error;

/// One response line sent back to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Integer result of a getter.
    Value(i64),
    /// Free text result, e.g. the last error message.
    Text(String),
    Ok,
    Error(String),
    Usage(&'static str),
    NotRecognized(String),
}

impl Reply {
    #[must_use]
    pub fn flag(flag: bool) -> Self {
        Reply::Value(i64::from(flag))
    }

    /// Whether this reply reports a failed command.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Reply::Error(_) | Reply::Usage(_) | Reply::NotRecognized(_)
        )
    }
}

impl From<&Error> for Reply {
    fn from(err: &Error) -> Self {
        match err {
            Error::SyntaxError { usage } => Reply::Usage(usage),
            Error::UnknownCommand(line) => Reply::NotRecognized(line.clone()),
            other => Reply::Error(other.to_string()),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reply::Value(v) => write!(f, "{v}"),
            Reply::Text(text) => f.write_str(text),
            Reply::Ok => f.write_str("OK"),
            Reply::Error(msg) => write!(f, "ERROR {msg}"),
            Reply::Usage(usage) => write!(f, "usage: {usage}"),
            Reply::NotRecognized(line) => write!(f, "command not recognized: {line}"),
        }
    }
}
