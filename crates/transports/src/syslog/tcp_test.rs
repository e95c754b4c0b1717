use super::*;
use crate::syslog::MAX_FRAME_SIZE;
use haul_protocol::Endpoint;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::time::Duration;

fn endpoint(addr: std::net::SocketAddr) -> Endpoint {
    Endpoint::parse(&format!("syslog+tcp://{addr}")).unwrap()
}

/// Read one octet-counted frame: digits, a space, then LEN bytes.
async fn read_frame(socket: &mut tokio::net::TcpStream) -> String {
    let mut len_buf = Vec::new();
    loop {
        let byte = socket.read_u8().await.expect("read length");
        if byte == b' ' {
            break;
        }
        len_buf.push(byte);
    }
    let len: usize = String::from_utf8(len_buf).unwrap().parse().unwrap();
    let mut msg = vec![0u8; len];
    socket.read_exact(&mut msg).await.expect("read message");
    String::from_utf8(msg).unwrap()
}

#[tokio::test]
async fn test_dial_unreachable_fails_with_connect_error() {
    // Port 1 on loopback refuses connections.
    let mut transport = SyslogTcp::new(Endpoint::parse("syslog+tcp://127.0.0.1:1").unwrap());
    let err = transport.dial().await.unwrap_err();
    assert!(matches!(err, TransportError::Connect { .. }));
}

#[tokio::test]
async fn test_dial_twice_fails_with_state_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut transport = SyslogTcp::new(endpoint(listener.local_addr().unwrap()));

    transport.dial().await.unwrap();
    assert!(matches!(
        transport.dial().await,
        Err(TransportError::State(_))
    ));
}

#[tokio::test]
async fn test_missing_port_fails_with_config_error() {
    let mut transport = SyslogTcp::new(Endpoint::parse("syslog+tcp://localhost").unwrap());
    assert!(matches!(
        transport.dial().await,
        Err(TransportError::Config(_))
    ));
}

#[tokio::test]
async fn test_records_arrive_framed_and_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let first = read_frame(&mut socket).await;
        let second = read_frame(&mut socket).await;
        (first, second)
    });

    let mut transport = SyslogTcp::new(endpoint(addr));
    transport.dial().await.unwrap();

    let records = transport.records();
    records
        .send(Record::now(0, 0, "web", "t1", "first"))
        .await
        .unwrap();
    records
        .send(Record::now(0, 0, "web", "t1", "second"))
        .await
        .unwrap();

    let (first, second) = server.await.unwrap();
    assert!(first.starts_with("<0>1 "));
    assert!(first.ends_with(" web t1 - - - first"));
    assert!(second.ends_with(" web t1 - - - second"));

    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_oversize_record_still_framed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_frame(&mut socket).await
    });

    let mut transport = SyslogTcp::new(endpoint(addr));
    transport.dial().await.unwrap();

    let big = "x".repeat(MAX_FRAME_SIZE * 2);
    transport
        .records()
        .send(Record::now(0, 0, "web", "t1", &big))
        .await
        .unwrap();

    // The frame parses cleanly and fits the cap.
    let msg = server.await.unwrap();
    assert_eq!(msg.len(), MAX_FRAME_SIZE);
    assert!(msg.ends_with("..."));

    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_errors_stream_closes_after_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut transport = SyslogTcp::new(endpoint(listener.local_addr().unwrap()));
    transport.dial().await.unwrap();

    let mut errors = transport.errors().expect("errors taken once");
    assert!(transport.errors().is_none());

    transport.close().await.unwrap();
    // Idempotent second close.
    transport.close().await.unwrap();

    // The egress task exits on cancel and drops its error sender.
    let closed = tokio::time::timeout(Duration::from_secs(1), errors.recv())
        .await
        .expect("error stream should close promptly");
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_peer_disconnect_surfaces_errors_then_terminates() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut transport = SyslogTcp::new(endpoint(addr));
    transport.dial().await.unwrap();
    let mut errors = transport.errors().unwrap();

    // Accept, then drop both the socket and the listener so writes fail
    // and every reconnect attempt is refused.
    let (socket, _) = listener.accept().await.unwrap();
    drop(socket);
    drop(listener);

    let records = transport.records();
    for i in 0..5 {
        // Writes into a dead socket may be absorbed by local buffers
        // once; keep sending until the failure shows up.
        let _ = records
            .send(Record::now(0, 0, "web", "t1", format!("m{i}")))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut saw_error = false;
    let mut closed = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_secs(10), errors.recv()).await {
            Ok(Some(_)) => saw_error = true,
            Ok(None) => {
                closed = true;
                break;
            }
            Err(_) => break,
        }
    }

    assert!(saw_error, "write failures should surface on errors()");
    assert!(closed, "error stream should close when the egress gives up");
}
