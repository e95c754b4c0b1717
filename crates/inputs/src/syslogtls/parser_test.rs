use super::*;
use chrono::TimeZone;

#[test]
fn test_full_message_decodes() {
    let decoded = parse("<11>1 2024-03-09T22:14:15.003Z web-prod worker.1 4321 ID47 - boom happened");

    assert_eq!(decoded.severity, Some(3));
    assert_eq!(decoded.facility, Some(1));
    assert_eq!(decoded.hostname.as_deref(), Some("web-prod"));
    assert_eq!(decoded.app_name.as_deref(), Some("worker.1"));
    assert_eq!(
        decoded.timestamp,
        Some(
            Utc.with_ymd_and_hms(2024, 3, 9, 22, 14, 15).unwrap()
                + chrono::Duration::milliseconds(3)
        )
    );
    assert_eq!(decoded.message.as_deref(), Some("boom happened"));
}

#[test]
fn test_nil_fields_stay_unset() {
    let decoded = parse("<0>1 - - - - - - payload");

    assert_eq!(decoded.severity, Some(0));
    assert_eq!(decoded.facility, Some(0));
    assert_eq!(decoded.hostname, None);
    assert_eq!(decoded.app_name, None);
    assert_eq!(decoded.timestamp, None);
    assert_eq!(decoded.message.as_deref(), Some("payload"));
}

#[test]
fn test_structured_data_is_skipped() {
    let decoded = parse(
        "<165>1 2024-03-09T22:14:15Z host app 1 ID [exampleSDID@32473 iut=\"3\" eventSource=\"App\"] the message",
    );

    assert_eq!(decoded.app_name.as_deref(), Some("app"));
    assert_eq!(decoded.message.as_deref(), Some("the message"));
}

#[test]
fn test_multiple_sd_elements() {
    let decoded = parse("<165>1 - host app 1 ID [a x=\"1\"][b y=\"2\"] tail");
    assert_eq!(decoded.message.as_deref(), Some("tail"));
}

#[test]
fn test_escaped_bracket_inside_sd() {
    let decoded = parse("<165>1 - host app 1 ID [a x=\"tricky \\] value\"] tail");
    assert_eq!(decoded.message.as_deref(), Some("tail"));
}

#[test]
fn test_missing_message_is_none() {
    let decoded = parse("<34>1 2024-03-09T22:14:15Z host app 999 ID47 -");
    assert_eq!(decoded.message, None);
}

#[test]
fn test_severity_facility_split() {
    // 23*8 + 7 = 191, the top of the range.
    let decoded = parse("<191>1 - - - - - - m");
    assert_eq!(decoded.severity, Some(7));
    assert_eq!(decoded.facility, Some(23));
}

#[test]
fn test_garbage_becomes_bare_message() {
    let decoded = parse("not syslog at all\r\n");

    assert_eq!(decoded.severity, None);
    assert_eq!(decoded.facility, None);
    assert_eq!(decoded.hostname, None);
    assert_eq!(decoded.message.as_deref(), Some("not syslog at all"));
}

#[test]
fn test_pri_out_of_range_becomes_bare_message() {
    let decoded = parse("<999>1 - - - - - - m");
    assert_eq!(decoded.severity, None);
    assert!(decoded.message.is_some());
}

#[test]
fn test_bad_timestamp_stays_unset() {
    let decoded = parse("<11>1 yesterday host app - - - m");
    assert_eq!(decoded.timestamp, None);
    assert_eq!(decoded.message.as_deref(), Some("m"));
}
