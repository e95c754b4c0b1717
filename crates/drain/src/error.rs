//! Drain error types

use haul_protocol::EndpointError;
use haul_transports::TransportError;
use thiserror::Error;

/// Errors from a drain: fatal configuration problems at construction,
/// lifecycle violations, and transport failures surfaced through the
/// drain's error stream.
#[derive(Debug, Error)]
pub enum DrainError {
    /// Connection cap out of bounds or other bad construction input.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Endpoint failed scheme-table validation.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// Illegal lifecycle call (second dial, dial after close).
    #[error("illegal drain state: {0}")]
    State(&'static str),

    /// A transport dial or post-dial failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
