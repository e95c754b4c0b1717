use super::*;
use chrono::TimeZone;
use chrono::Utc;

fn record(message: &str) -> Record {
    let ts = Utc.with_ymd_and_hms(2024, 3, 9, 22, 14, 15).unwrap();
    Record::new(3, 1, ts, "web-prod", "worker.1", message)
}

#[test]
fn test_render_rfc5424_shape() {
    let line = render_rfc5424(&record("hello world"));
    assert_eq!(
        line,
        "<11>1 2024-03-09T22:14:15.000000+00:00 web-prod worker.1 - - - hello world"
    );
}

#[test]
fn test_render_nil_fields() {
    let mut rec = record("x");
    rec.hostname = String::new();
    rec.tag = String::new();

    let line = render_rfc5424(&rec);
    assert!(line.contains(" - - - - - x"));
}

#[test]
fn test_oversize_message_truncated_with_mark() {
    let big = "a".repeat(MAX_FRAME_SIZE * 2);
    let line = render_rfc5424(&record(&big));

    assert_eq!(line.len(), MAX_FRAME_SIZE);
    assert!(line.ends_with("aaa..."));
    // Header still intact - a downstream parser sees a well-formed frame.
    assert!(line.starts_with("<11>1 2024-03-09T22:14:15.000000+00:00 web-prod worker.1 - - - "));
}

#[test]
fn test_truncation_respects_char_boundaries() {
    // Fill with multi-byte chars so a naive byte cut would split one.
    let big = "é".repeat(MAX_FRAME_SIZE);
    let line = render_rfc5424(&record(&big));

    assert!(line.len() <= MAX_FRAME_SIZE);
    assert!(line.ends_with("..."));
    assert!(std::str::from_utf8(line.as_bytes()).is_ok());
}

#[test]
fn test_exact_fit_not_truncated() {
    let header_len = render_rfc5424(&record("")).len();
    let msg = "b".repeat(MAX_FRAME_SIZE - header_len);
    let line = render_rfc5424(&record(&msg));

    assert_eq!(line.len(), MAX_FRAME_SIZE);
    assert!(!line.ends_with("..."));
}

#[test]
fn test_octet_counted_framing() {
    let frame = frame_octet_counted("<11>1 - - - - - - hi");
    let text = String::from_utf8(frame).unwrap();

    let (len, rest) = text.split_once(' ').unwrap();
    assert_eq!(len.parse::<usize>().unwrap(), rest.len());
    assert_eq!(rest, "<11>1 - - - - - - hi");
}
