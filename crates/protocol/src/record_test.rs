use super::*;
use chrono::TimeZone;

#[test]
fn test_pri_combines_facility_and_severity() {
    let rec = Record::now(3, 1, "web", "worker.1", "boom");
    assert_eq!(rec.pri(), 11);

    let rec = Record::now(0, 0, "web", "worker.1", "ok");
    assert_eq!(rec.pri(), 0);

    // local7.debug, the top of the table
    let rec = Record::now(7, 23, "web", "worker.1", "dbg");
    assert_eq!(rec.pri(), 191);
}

#[test]
fn test_rfc5424_time_layout() {
    let ts = Utc.with_ymd_and_hms(2024, 3, 9, 22, 14, 15).unwrap()
        + chrono::Duration::microseconds(3_000);
    let rec = Record::new(0, 0, ts, "web", "t", "m");

    assert_eq!(rec.rfc5424_time(), "2024-03-09T22:14:15.003000+00:00");
}

#[test]
fn test_now_stamps_current_instant() {
    let before = Utc::now();
    let rec = Record::now(0, 0, "web", "t", "m");
    let after = Utc::now();

    assert!(rec.timestamp >= before && rec.timestamp <= after);
}

#[test]
fn test_records_compare_by_value() {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let a = Record::new(1, 2, ts, "h", "t", "m");
    let b = a.clone();

    assert_eq!(a, b);
}
