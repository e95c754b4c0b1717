//! The uniform in-memory log datum
//!
//! Every input normalizes its foreign format into a `Record` before the
//! record enters a drain; every transport serializes a `Record` onto its
//! wire. Records are copied by value across channel boundaries - nothing
//! mutates a record after an input publishes it.

use chrono::{DateTime, Utc};

/// RFC5424 TIMESTAMP layout (microsecond precision, numeric offset).
///
/// Used both when rendering syslog frames and inside bulk-index
/// documents, so that a record round-trips with the same textual time.
pub const RFC5424_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

/// A single normalized log record.
///
/// All six fields are set before a record leaves an input; inputs
/// substitute "now" for timestamps they cannot parse. The message may
/// contain any byte - escaping for a particular wire format is the
/// owning transport's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Syslog severity (0-7).
    pub severity: u8,

    /// Syslog facility.
    pub facility: u8,

    /// Absolute instant with nanosecond precision.
    pub timestamp: DateTime<Utc>,

    /// Logical source application/host. Non-empty.
    pub hostname: String,

    /// Sub-source (process, container, dyno).
    pub tag: String,

    /// Free-form payload.
    pub message: String,
}

impl Record {
    /// Create a record with an explicit timestamp.
    pub fn new(
        severity: u8,
        facility: u8,
        timestamp: DateTime<Utc>,
        hostname: impl Into<String>,
        tag: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            facility,
            timestamp,
            hostname: hostname.into(),
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Create a record stamped with the current instant.
    pub fn now(
        severity: u8,
        facility: u8,
        hostname: impl Into<String>,
        tag: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(severity, facility, Utc::now(), hostname, tag, message)
    }

    /// Syslog PRI value (`facility * 8 + severity`).
    #[inline]
    pub fn pri(&self) -> u8 {
        self.facility * 8 + self.severity
    }

    /// Timestamp rendered in the RFC5424 TIMESTAMP layout.
    pub fn rfc5424_time(&self) -> String {
        self.timestamp.format(RFC5424_TIME_FORMAT).to_string()
    }
}

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;
