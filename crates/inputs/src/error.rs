//! Input error types

use thiserror::Error;

/// Errors surfaced on an input's error stream or returned from its
/// lifecycle calls. Per-record parse failures are deliberately absent -
/// those are counted per source, not surfaced.
#[derive(Debug, Error)]
pub enum InputError {
    /// Illegal lifecycle call (second dial, dial after close).
    #[error("illegal input state: {0}")]
    State(&'static str),

    /// Listener or filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// Directory watcher failure.
    #[error("directory watch error: {0}")]
    Watch(String),

    /// Orchestrator lookup failure during hostname/tag derivation.
    #[error("orchestrator lookup failed: {0}")]
    Orchestrator(String),
}

impl InputError {
    /// Create a TLS error.
    pub(crate) fn tls(msg: impl ToString) -> Self {
        Self::Tls(msg.to_string())
    }
}

impl From<notify::Error> for InputError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}
