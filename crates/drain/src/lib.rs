//! haul - Drain
//!
//! One [`Drain`] per destination endpoint. The drain owns an adaptive
//! pool of transport connections, measures backpressure on its ingress
//! buffer, and dispatches each record to exactly one connection under a
//! distribution policy latched at dial time:
//!
//! - **transport-pooled** - the transport multiplexes internally
//!   (`pools()` = true); the pool never grows past one connection.
//! - **sticky** - records partition by the crc32 of hostname and tag,
//!   so a key deterministically lands on one connection.
//! - **round-robin** - monotonic counter modulo pool size.
//!
//! Backpressure drives pool growth: the smoothed fill ratio of the
//! ingress buffer (one-pole IIR, alpha 0.5) triggers an async dial when
//! it crosses one half, bounded by the connection cap. A connection
//! whose error stream closes is removed; a floor of one connection is
//! re-dialed while the drain is open.
//!
//! ```text
//! input() --Record--> [dispatch task] --policy--> connection 0..n --> sink
//!                          |                          |
//!                       pressure                   monitor task
//! ```

mod drain;
mod error;
mod metrics;

pub use drain::{Drain, INGRESS_BUFFER, MAX_POOL_CAP};
pub use error::DrainError;
pub use metrics::{DrainMetrics, DrainMetricsHandle, DrainMetricsSnapshot};
