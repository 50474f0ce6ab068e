use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Malformed or unrecognized GX container bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    Truncated { len: usize },
    BadMagic(String),
    BadOffsets { bmp: u32, start: u32, end: u32, len: usize },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::Truncated { len } =>
                write!(f, "container too short: {} bytes", len),
            FormatError::BadMagic(tag) =>
                write!(f, "unrecognized container magic {:?}", tag),
            FormatError::BadOffsets { bmp, start, end, len } =>
                write!(f, "inconsistent offsets bmp={} start={} end={} len={}", bmp, start, end, len),
        }
    }
}

impl std::error::Error for FormatError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    AlreadyConnecting,
    AlreadyConnected,
    NotConnected,
    TimedOut,
    Closed(String),
    Io { kind: io::ErrorKind, message: String },
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::AlreadyConnecting =>
                write!(f, "already connecting"),
            ConnectionError::AlreadyConnected =>
                write!(f, "already connected"),
            ConnectionError::NotConnected =>
                write!(f, "not connected"),
            ConnectionError::TimedOut =>
                write!(f, "connection timed out"),
            ConnectionError::Closed(reason) =>
                write!(f, "connection closed: {}", reason),
            ConnectionError::Io { kind, message } =>
                write!(f, "socket error ({:?}): {}", kind, message),
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Crate-wide error. Cloneable so one socket failure can fail every queued command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Format(FormatError),
    Connection(ConnectionError),
    Protocol(String),
    Transfer(String),
}

impl Error {
    pub fn closed(reason: impl Into<String>) -> Self {
        Error::Connection(ConnectionError::Closed(reason.into()))
    }

    /// True for errors that a fresh connect attempt may clear.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connection(ConnectionError::AlreadyConnecting)
            | Error::Connection(ConnectionError::AlreadyConnected) => false,
            Error::Connection(_) | Error::Protocol(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Format(e) => write!(f, "format error: {}", e),
            Error::Connection(e) => write!(f, "connection error: {}", e),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::Transfer(msg) => write!(f, "transfer error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Format(e) => Some(e),
            Error::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Error::Format(e)
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Error::Connection(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        let conn = match e.kind() {
            io::ErrorKind::TimedOut => ConnectionError::TimedOut,
            kind => ConnectionError::Io { kind, message: e.to_string() },
        };
        Error::Connection(conn)
    }
}
