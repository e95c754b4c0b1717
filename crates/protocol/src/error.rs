//! Protocol error types

use thiserror::Error;

/// Errors from endpoint parsing. Fatal at construction time - nothing
/// downstream retries a bad endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The scheme is not in the scheme table.
    #[error("unknown endpoint scheme: {0}")]
    UnknownScheme(String),

    /// The URL itself does not parse or is missing required parts.
    #[error("malformed endpoint: {0}")]
    Malformed(String),
}
