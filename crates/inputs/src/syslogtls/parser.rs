//! RFC5424 message decoding
//!
//! Each RFC6587 non-transparent frame carries one RFC5424 message:
//!
//! ```text
//! <PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID SD MSG
//! ```
//!
//! Decoding is permissive by contract: a field that is missing, nil
//! (`-`), or malformed simply stays unset, and a line that is not
//! syslog at all becomes a bare message. The caller defaults unset
//! fields when it builds the record.

use chrono::{DateTime, Utc};

/// A map-like decoded syslog message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyslogMessage {
    pub severity: Option<u8>,
    pub facility: Option<u8>,
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

/// Decode one frame. Never fails; unparseable input degrades to a bare
/// message.
pub fn parse(line: &str) -> SyslogMessage {
    let line = line.trim_end_matches(['\r', '\n']);

    match parse_rfc5424(line) {
        Some(message) => message,
        None => SyslogMessage {
            message: Some(line.to_string()),
            ..Default::default()
        },
    }
}

fn parse_rfc5424(line: &str) -> Option<SyslogMessage> {
    // <PRI>
    let rest = line.strip_prefix('<')?;
    let (pri, rest) = rest.split_once('>')?;
    let pri: u16 = pri.parse().ok()?;
    if pri > 191 {
        return None;
    }

    // VERSION
    let rest = rest.strip_prefix('1')?;
    let rest = rest.strip_prefix(' ')?;

    let mut fields = rest.splitn(5, ' ');
    let timestamp = fields.next()?;
    let hostname = fields.next()?;
    let app_name = fields.next()?;
    let _procid = fields.next()?;
    let rest = fields.next()?;

    // MSGID, then structured data, then the free-form message.
    let (_msgid, rest) = rest.split_once(' ').unwrap_or((rest, ""));
    let message = skip_structured_data(rest);

    Some(SyslogMessage {
        severity: Some((pri % 8) as u8),
        facility: Some((pri / 8) as u8),
        hostname: non_nil(hostname),
        app_name: non_nil(app_name),
        timestamp: DateTime::parse_from_rfc3339(timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        message: if message.is_empty() {
            None
        } else {
            Some(message.to_string())
        },
    })
}

/// A nil field (`-`) decodes as unset.
fn non_nil(field: &str) -> Option<String> {
    if field == "-" {
        None
    } else {
        Some(field.to_string())
    }
}

/// Step over the SD element(s) - `-` or one or more `[...]` groups -
/// and return the message that follows.
fn skip_structured_data(rest: &str) -> &str {
    if let Some(msg) = rest.strip_prefix("- ") {
        return msg;
    }
    if rest == "-" {
        return "";
    }

    let mut remaining = rest;
    while remaining.starts_with('[') {
        let mut escaped = false;
        let mut end = None;
        for (i, ch) in remaining.char_indices() {
            match ch {
                '\\' if !escaped => escaped = true,
                ']' if !escaped => {
                    end = Some(i);
                    break;
                }
                _ => escaped = false,
            }
        }
        match end {
            Some(i) => remaining = &remaining[i + 1..],
            None => return "",
        }
    }
    remaining.strip_prefix(' ').unwrap_or(remaining)
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod parser_test;
