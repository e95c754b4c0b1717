use super::*;
use std::io::Write;
use tokio::time::{sleep, timeout, Duration};

const HEX_ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

fn log_name(pod: &str, namespace: &str) -> String {
    format!("{pod}_{namespace}_app-{HEX_ID}.log")
}

fn line(msg: &str) -> String {
    format!("{{\"log\":\"{msg}\",\"stream\":\"stdout\",\"time\":\"2024-03-09T22:14:15Z\"}}\n")
}

fn input_for(dir: &std::path::Path) -> KubeTail {
    KubeTail::new(
        KubeTailConfig {
            path: dir.to_path_buf(),
            app_platform: false,
        },
        None,
    )
}

async fn next(rx: &mut mpsc::Receiver<Record>) -> Record {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("record should arrive")
        .expect("stream open")
}

#[tokio::test]
async fn test_startup_scan_tails_from_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(log_name("web-abc12-def34", "default"));
    std::fs::write(&path, line("history")).unwrap();

    let mut input = input_for(dir.path());
    let mut records = input.records().unwrap();
    input.dial().await.unwrap();
    assert_eq!(input.watched_paths().await, vec![path.clone()]);

    // History is skipped; appended lines flow with derived names.
    sleep(Duration::from_millis(300)).await;
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(line("fresh").as_bytes()).unwrap();

    let record = next(&mut records).await;
    assert_eq!(record.message, "fresh");
    assert_eq!(record.hostname, "web.default");
    assert_eq!(record.tag, "web-abc12-def34");

    input.close().await.unwrap();
}

#[tokio::test]
async fn test_non_matching_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), line("not a container log")).unwrap();

    let mut input = input_for(dir.path());
    input.dial().await.unwrap();

    assert!(input.watched_paths().await.is_empty());

    // A non-matching file created later is also ignored.
    std::fs::write(dir.path().join("more.txt"), line("still not")).unwrap();
    sleep(Duration::from_millis(500)).await;
    assert!(input.watched_paths().await.is_empty());

    input.close().await.unwrap();
}

#[tokio::test]
async fn test_created_file_is_read_from_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = input_for(dir.path());
    let mut records = input.records().unwrap();
    input.dial().await.unwrap();

    let path = dir.path().join(log_name("api-abc12-def34", "prod"));
    std::fs::write(&path, line("first")).unwrap();

    let record = next(&mut records).await;
    assert_eq!(record.message, "first");
    assert_eq!(record.hostname, "api.prod");

    input.close().await.unwrap();
}

#[tokio::test]
async fn test_watcher_survives_remove_events() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = input_for(dir.path());
    let mut records = input.records().unwrap();
    input.dial().await.unwrap();

    // Create, observe, then remove a first file.
    let first = dir.path().join(log_name("one-abc12-def34", "default"));
    std::fs::write(&first, line("from-one")).unwrap();
    assert_eq!(next(&mut records).await.message, "from-one");

    std::fs::remove_file(&first).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if input.watched_paths().await.is_empty() {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert!(input.watched_paths().await.is_empty());

    // The directory watcher keeps running: a second file still works.
    let second = dir.path().join(log_name("two-abc12-def34", "default"));
    std::fs::write(&second, line("from-two")).unwrap();
    assert_eq!(next(&mut records).await.message, "from-two");

    input.close().await.unwrap();
}

#[tokio::test]
async fn test_parse_failures_counted_per_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = input_for(dir.path());
    let mut records = input.records().unwrap();
    input.dial().await.unwrap();

    let path = dir.path().join(log_name("web-abc12-def34", "default"));
    std::fs::write(&path, format!("corrupted line\n{}", line("good"))).unwrap();

    assert_eq!(next(&mut records).await.message, "good");
    assert_eq!(input.parse_errors(&path).await, Some(1));

    input.close().await.unwrap();
}

#[tokio::test]
async fn test_dial_twice_fails_with_state_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = input_for(dir.path());
    input.dial().await.unwrap();

    assert!(matches!(
        input.dial().await,
        Err(InputError::State(_))
    ));
    input.close().await.unwrap();
}

#[tokio::test]
async fn test_close_closes_record_stream() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(log_name("web-abc12-def34", "default")),
        line("ignored"),
    )
    .unwrap();

    let mut input = input_for(dir.path());
    let mut records = input.records().unwrap();
    input.dial().await.unwrap();

    input.close().await.unwrap();

    let closed = timeout(Duration::from_secs(5), records.recv())
        .await
        .expect("record stream should close after close()");
    assert!(closed.is_none());
}
