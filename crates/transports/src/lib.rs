//! haul - Transports
//!
//! A transport is one logical connection to one remote sink: it owns a
//! bounded egress channel of [`Record`]s and a task that serializes them
//! onto its wire. Drains own transports and never touch sockets
//! themselves.
//!
//! ```text
//! [Drain] --Record--> [egress channel] --> [egress task] --> wire
//!                                              |
//!                                              +--> errors()
//! ```
//!
//! # Families
//!
//! | Scheme | Type | `pools()` |
//! |--------|------|-----------|
//! | `syslog+tcp://` | [`SyslogTcp`] | false |
//! | `syslog+tls://` | [`SyslogTls`] | false |
//! | `syslog://`, `syslog+udp://` | [`SyslogUdp`] | false |
//! | `syslog+http[s]://`, `http[s]://` | [`SyslogHttp`] | true |
//! | `elasticsearch…://`, `es…://` | [`SearchIndex`] | true |
//!
//! A pooling transport multiplexes sends internally, so its owning drain
//! keeps exactly one connection to it.

use async_trait::async_trait;
use haul_protocol::{Endpoint, Record, TransportKind};
use tokio::sync::mpsc;

mod error;
mod search_index;
pub mod syslog;

pub use error::TransportError;
pub use search_index::{SearchIndex, APP_PLATFORM_ENV, NODE_ENV};
pub use syslog::http::SyslogHttp;
pub use syslog::tcp::SyslogTcp;
pub use syslog::tls::{SyslogTls, TlsClientSettings};
pub use syslog::udp::SyslogUdp;
pub use syslog::MAX_FRAME_SIZE;

/// Capacity of every transport's post-dial error stream. Producers use
/// `try_send` and drop on overflow rather than stall the egress path.
pub(crate) const ERRORS_BUFFER: usize = 16;

/// One logical connection to one sink.
///
/// Lifecycle: construct, `dial()` once, feed records through the sender
/// from [`records`](Transport::records), watch
/// [`errors`](Transport::errors) until it closes (transport terminated),
/// `close()` any number of times.
#[async_trait]
pub trait Transport: Send {
    /// Establish the connection and start the egress task.
    async fn dial(&mut self) -> Result<(), TransportError>;

    /// Sender half of the transport's bounded egress channel.
    fn records(&self) -> mpsc::Sender<Record>;

    /// Take the post-dial error stream. Yields once; the stream closing
    /// means the transport has terminated.
    fn errors(&mut self) -> Option<mpsc::Receiver<TransportError>>;

    /// Whether this transport multiplexes many logical sends over its
    /// own internal pool.
    fn pools(&self) -> bool;

    /// Idempotent teardown. After close, the error stream closes.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Construct the transport for an endpoint via the static scheme table.
///
/// No network I/O happens until [`Transport::dial`].
pub fn create(endpoint: &Endpoint) -> Box<dyn Transport> {
    match endpoint.kind() {
        TransportKind::SyslogTcp => Box::new(SyslogTcp::new(endpoint.clone())),
        TransportKind::SyslogTls => {
            Box::new(SyslogTls::new(endpoint.clone(), TlsClientSettings::from_env()))
        }
        TransportKind::SyslogUdp => Box::new(SyslogUdp::new(endpoint.clone())),
        TransportKind::SyslogHttp => Box::new(SyslogHttp::new(endpoint.clone())),
        TransportKind::SearchIndex => Box::new(SearchIndex::new(endpoint.clone())),
    }
}

/// Validate an endpoint URL against the scheme table without
/// constructing a transport.
pub fn test_endpoint(raw: &str) -> Result<(), TransportError> {
    Endpoint::parse(raw).map(|_| ()).map_err(TransportError::from)
}
