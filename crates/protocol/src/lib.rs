//! haul - Protocol
//!
//! The wire-neutral types shared by every layer of the pipeline:
//!
//! - [`Record`] - the uniform in-memory log datum produced by inputs and
//!   consumed by drains and transports.
//! - [`Endpoint`] - a parsed destination URL whose scheme selects the
//!   transport family.
//!
//! ```text
//! [Input] --Record--> [Drain] --Record--> [Transport] --> sink @ Endpoint
//! ```

mod endpoint;
mod error;
mod record;

pub use endpoint::{AuthMode, Endpoint, TransportKind};
pub use error::EndpointError;
pub use record::{Record, RFC5424_TIME_FORMAT};
