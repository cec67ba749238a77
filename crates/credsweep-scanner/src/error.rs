use credsweep_core::ConfigError;
use credsweep_db::DatabaseError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("result sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Broad cause of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Request or response exceeded the configured timeout
    Timeout,
    /// Connection could not be established (DNS, refused, reset, TLS handshake)
    Connect,
    /// Connection was established but the exchange broke down
    Protocol,
    /// Anything else, including client construction
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connect"),
            Self::Protocol => write!(f, "protocol"),
            Self::Other => write!(f, "transport"),
        }
    }
}

/// A challenge that never produced a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() || err.is_request() {
            TransportErrorKind::Protocol
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("finding rejected: {0}")]
    Rejected(String),
}
