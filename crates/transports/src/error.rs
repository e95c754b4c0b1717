//! Transport error types

use haul_protocol::EndpointError;
use thiserror::Error;

/// Errors from transports, both at dial time and post-dial on the error
/// stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint scheme unknown or options malformed.
    #[error("invalid endpoint: {0}")]
    Config(#[from] EndpointError),

    /// Dial failed - sink unreachable.
    #[error("connect failed to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Credentials rejected by the sink.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Post-dial socket error.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// HTTP request could not be performed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Sink answered with a non-success status.
    #[error("endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Dial or write exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Illegal lifecycle call (dial twice).
    #[error("illegal transport state: {0}")]
    State(&'static str),
}

impl TransportError {
    /// Create a connect error from an I/O failure against `target`.
    pub fn connect(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connect {
            target: target.into(),
            source,
        }
    }

    /// Create a TLS error.
    pub fn tls(msg: impl ToString) -> Self {
        Self::Tls(msg.to_string())
    }
}
