//! haul - Inputs
//!
//! Input adaptors convert foreign log streams into the uniform
//! [`Record`](haul_protocol::Record) stream that drains consume:
//!
//! - [`KubeTail`] - watches a directory of container log files, tails
//!   each one, parses the runtime's JSON line format, and derives the
//!   logical hostname/tag from the orchestrator.
//! - [`SyslogTlsInput`] - a TLS listener accepting RFC6587-framed
//!   RFC5424 syslog and normalizing each message.
//!
//! Both expose a record stream and an error stream; per-record parse
//! failures are counted, never surfaced, so one corrupted source cannot
//! poison the whole input.

mod error;
pub mod kubetail;
pub mod syslogtls;

pub use error::InputError;
pub use kubetail::{KubeTail, KubeTailConfig};
pub use syslogtls::{SyslogTlsConfig, SyslogTlsInput};
