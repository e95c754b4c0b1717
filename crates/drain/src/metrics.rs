//! Drain metrics
//!
//! Atomic counters written by the dispatch and monitor tasks, read
//! without synchronization through cloneable handles. The smoothed
//! pressure rides in an `AtomicU64` as raw f64 bits.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics for one drain.
#[derive(Debug)]
pub struct DrainMetrics {
    /// Pool cap, fixed at creation.
    max_connections: u32,

    /// Current pool size.
    open: AtomicU32,

    /// Records dispatched. Also the round-robin rotation counter.
    sent: AtomicU64,

    /// Transport errors observed by connection monitors.
    errors: AtomicU64,

    /// Smoothed ingress fill ratio in [0,1], as f64 bits.
    pressure: AtomicU64,
}

impl DrainMetrics {
    /// Create zeroed metrics with the given pool cap.
    pub fn new(max_connections: u32) -> Self {
        Self {
            max_connections,
            open: AtomicU32::new(0),
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            pressure: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Pool cap.
    #[inline]
    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    /// Current pool size.
    #[inline]
    pub fn open_connections(&self) -> u32 {
        self.open.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_open(&self, open: u32) {
        self.open.store(open, Ordering::Relaxed);
    }

    /// Records dispatched since creation or the last reset.
    #[inline]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Count one dispatched record, returning the new total.
    #[inline]
    pub(crate) fn record_sent(&self) -> u64 {
        self.sent.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Transport errors since creation or the last reset.
    #[inline]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Count one transport error.
    #[inline]
    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Smoothed ingress pressure in [0,1].
    #[inline]
    pub fn pressure(&self) -> f64 {
        f64::from_bits(self.pressure.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn set_pressure(&self, pressure: f64) {
        self.pressure.store(pressure.to_bits(), Ordering::Relaxed);
    }

    /// Zero `sent` and `errors`. Pressure and the open count describe
    /// current state and are left alone.
    pub fn reset(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }

    /// Point-in-time view of all counters.
    pub fn snapshot(&self) -> DrainMetricsSnapshot {
        DrainMetricsSnapshot {
            max_connections: self.max_connections,
            open_connections: self.open_connections(),
            pressure: self.pressure(),
            sent: self.sent(),
            errors: self.errors(),
        }
    }
}

/// Point-in-time snapshot of drain metrics.
#[derive(Debug, Clone, Copy)]
pub struct DrainMetricsSnapshot {
    pub max_connections: u32,
    pub open_connections: u32,
    pub pressure: f64,
    pub sent: u64,
    pub errors: u64,
}

/// Cloneable handle for reading one drain's metrics externally.
///
/// Remains valid for the life of the drain's tasks, independent of the
/// `Drain` value itself.
#[derive(Debug, Clone)]
pub struct DrainMetricsHandle {
    endpoint: String,
    metrics: Arc<DrainMetrics>,
}

impl DrainMetricsHandle {
    pub(crate) fn new(endpoint: String, metrics: Arc<DrainMetrics>) -> Self {
        Self { endpoint, metrics }
    }

    /// The endpoint this drain ships to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current counter values.
    pub fn snapshot(&self) -> DrainMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Zero `sent` and `errors`, leaving pressure and the open count.
    pub fn reset(&self) {
        self.metrics.reset()
    }
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod metrics_test;
