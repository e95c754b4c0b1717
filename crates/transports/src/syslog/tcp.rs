//! Syslog over plain TCP
//!
//! One socket per transport (`pools()` = false); the drain grows its
//! pool by creating more of these. The egress task writes octet-counted
//! frames and reconnects in place on write failure, surfacing every
//! failure on the error stream. When its write attempts are exhausted
//! the task terminates, which closes the error stream and lets the
//! owning drain replace the connection.

use std::future::Future;
use std::io::ErrorKind;

use haul_protocol::{Endpoint, Record};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;

use super::{frame_octet_counted, render_rfc5424, EGRESS_BUFFER, SOCKET_TIMEOUT, WRITE_ATTEMPTS};
use crate::{Transport, TransportError, ERRORS_BUFFER};

/// Syslog-over-TCP transport.
pub struct SyslogTcp {
    endpoint: Endpoint,
    records_tx: mpsc::Sender<Record>,
    records_rx: Option<mpsc::Receiver<Record>>,
    errors_tx: Option<mpsc::Sender<TransportError>>,
    errors_rx: Option<mpsc::Receiver<TransportError>>,
    cancel: CancellationToken,
}

impl SyslogTcp {
    /// Create an undialed transport for `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        let (records_tx, records_rx) = mpsc::channel(EGRESS_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_BUFFER);
        Self {
            endpoint,
            records_tx,
            records_rx: Some(records_rx),
            errors_tx: Some(errors_tx),
            errors_rx: Some(errors_rx),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Transport for SyslogTcp {
    async fn dial(&mut self) -> Result<(), TransportError> {
        let rx = self
            .records_rx
            .take()
            .ok_or(TransportError::State("dial may only be called once"))?;
        let errors_tx = self
            .errors_tx
            .take()
            .ok_or(TransportError::State("dial may only be called once"))?;

        let target = self.endpoint.socket_addr()?;
        let stream = connect(&target).await?;

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let reconnect_target = target.clone();
            run_egress(target, stream, rx, errors_tx, cancel, move || {
                let target = reconnect_target.clone();
                async move { connect(&target).await }
            })
            .await;
        });
        Ok(())
    }

    fn records(&self) -> mpsc::Sender<Record> {
        self.records_tx.clone()
    }

    fn errors(&mut self) -> Option<mpsc::Receiver<TransportError>> {
        self.errors_rx.take()
    }

    fn pools(&self) -> bool {
        false
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.cancel.cancel();
        Ok(())
    }
}

/// Dial `target` with the socket deadline and TCP_NODELAY set.
pub(crate) async fn connect(target: &str) -> Result<TcpStream, TransportError> {
    match timeout(SOCKET_TIMEOUT, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(addr = %target, error = %e, "failed to set TCP_NODELAY");
            }
            Ok(stream)
        }
        Ok(Err(e)) => Err(TransportError::connect(target, e)),
        Err(_) => Err(TransportError::connect(
            target,
            std::io::Error::new(ErrorKind::TimedOut, "connection timed out"),
        )),
    }
}

/// Shared egress loop for the stream-socket flavors.
///
/// `reconnect` re-establishes the wire after a write failure; TLS reuses
/// this loop with a reconnect that also re-handshakes.
pub(crate) async fn run_egress<S, F, Fut>(
    target: String,
    mut stream: S,
    mut rx: mpsc::Receiver<Record>,
    errors: mpsc::Sender<TransportError>,
    cancel: CancellationToken,
    mut reconnect: F,
) where
    S: AsyncWrite + Unpin + Send,
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<S, TransportError>> + Send,
{
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(record) => {
                    let frame = frame_octet_counted(&render_rfc5424(&record));
                    if !write_frame(&mut stream, &frame, &errors, &mut reconnect).await {
                        tracing::warn!(
                            addr = %target,
                            "syslog egress exhausted write attempts, terminating"
                        );
                        return;
                    }
                }
                None => return,
            },
            _ = cancel.cancelled() => return,
        }
    }
    // Dropping the errors sender closes the error stream, signalling
    // termination to the owning drain.
}

/// Write one frame, reconnecting between attempts. Returns false when
/// the attempts are exhausted; every failure is surfaced on `errors`.
async fn write_frame<S, F, Fut>(
    stream: &mut S,
    frame: &[u8],
    errors: &mpsc::Sender<TransportError>,
    reconnect: &mut F,
) -> bool
where
    S: AsyncWrite + Unpin + Send,
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<S, TransportError>> + Send,
{
    for attempt in 0..WRITE_ATTEMPTS {
        if attempt > 0 {
            match reconnect().await {
                Ok(fresh) => *stream = fresh,
                Err(e) => {
                    let _ = errors.try_send(e);
                    continue;
                }
            }
        }

        let write = async {
            stream.write_all(frame).await?;
            stream.flush().await
        };
        match timeout(SOCKET_TIMEOUT, write).await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => {
                let _ = errors.try_send(TransportError::Io(e));
            }
            Err(_) => {
                let _ = errors.try_send(TransportError::Timeout);
            }
        }
    }
    false
}

#[cfg(test)]
#[path = "tcp_test.rs"]
mod tcp_test;
