//! Syslog transport family
//!
//! RFC5424 message rendering shared by the socket and HTTP flavors, plus
//! the per-flavor egress loops:
//!
//! - [`tcp::SyslogTcp`] - one TCP socket, octet-counted (RFC5425) frames
//! - [`tls::SyslogTls`] - the same over rustls
//! - [`udp::SyslogUdp`] - one datagram per record
//! - [`http::SyslogHttp`] - rendered lines batched into
//!   `application/syslog` POST bodies
//!
//! # Framing
//!
//! The socket flavors prefix each message with its byte length
//! (`LEN SP MSG`), so a peer can re-frame the stream without trusting
//! message bytes. UDP and HTTP carry one message per datagram / body
//! line and need no length prefix.

use haul_protocol::Record;

pub mod http;
pub mod tcp;
pub mod tls;
pub mod udp;

/// Largest frame the family will put on the wire. Longer messages are
/// truncated with an indicator so the frame stays parseable.
pub const MAX_FRAME_SIZE: usize = 99_990;

/// Appended to a truncated message body.
const TRUNCATION_MARK: &str = "...";

/// Egress channel capacity for the socket flavors.
pub(crate) const EGRESS_BUFFER: usize = 16;

/// Dial and write deadline for the socket flavors.
pub(crate) const SOCKET_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(4);

/// Write attempts (with reconnect between) before a socket flavor gives
/// up on a record and terminates.
pub(crate) const WRITE_ATTEMPTS: usize = 3;

/// RFC5424 NILVALUE for empty header fields.
fn field(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

/// Render a record as an RFC5424 message:
/// `<PRI>1 TIMESTAMP HOSTNAME APP-NAME - - - MSG`.
///
/// The record tag rides in APP-NAME; PROCID, MSGID and structured data
/// are nil. Messages that would push the frame past [`MAX_FRAME_SIZE`]
/// are cut at a char boundary and marked.
pub fn render_rfc5424(record: &Record) -> String {
    let mut line = format!(
        "<{}>1 {} {} {} - - - ",
        record.pri(),
        record.rfc5424_time(),
        field(&record.hostname),
        field(&record.tag),
    );

    let budget = MAX_FRAME_SIZE.saturating_sub(line.len());
    if record.message.len() > budget {
        let mut cut = budget.saturating_sub(TRUNCATION_MARK.len());
        while cut > 0 && !record.message.is_char_boundary(cut) {
            cut -= 1;
        }
        line.push_str(&record.message[..cut]);
        line.push_str(TRUNCATION_MARK);
    } else {
        line.push_str(&record.message);
    }
    line
}

/// Octet-counted framing (RFC5425): `LEN SP MSG`.
pub fn frame_octet_counted(message: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(message.len() + 8);
    frame.extend_from_slice(message.len().to_string().as_bytes());
    frame.push(b' ');
    frame.extend_from_slice(message.as_bytes());
    frame
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
