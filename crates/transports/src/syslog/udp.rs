//! Syslog over UDP
//!
//! Connectionless flavor behind `syslog://` and `syslog+udp://`. One
//! RFC5424 message per datagram, no framing. Send failures surface on
//! the error stream; there is nothing to reconnect.

use haul_protocol::{Endpoint, Record};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;

use super::{render_rfc5424, EGRESS_BUFFER};
use crate::{Transport, TransportError, ERRORS_BUFFER};

/// Syslog-over-UDP transport.
pub struct SyslogUdp {
    endpoint: Endpoint,
    records_tx: mpsc::Sender<Record>,
    records_rx: Option<mpsc::Receiver<Record>>,
    errors_tx: Option<mpsc::Sender<TransportError>>,
    errors_rx: Option<mpsc::Receiver<TransportError>>,
    cancel: CancellationToken,
}

impl SyslogUdp {
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
impl Transport for SyslogUdp {
    async fn dial(&mut self) -> Result<(), TransportError> {
        let mut rx = self
            .records_rx
            .take()
            .ok_or(TransportError::State("dial may only be called once"))?;
        let errors_tx = self
            .errors_tx
            .take()
            .ok_or(TransportError::State("dial may only be called once"))?;

        let target = self.endpoint.socket_addr()?;
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| TransportError::connect(&target, e))?;
        socket
            .connect(&target)
            .await
            .map_err(|e| TransportError::connect(&target, e))?;

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = rx.recv() => match maybe {
                        Some(record) => {
                            let line = render_rfc5424(&record);
                            if let Err(e) = socket.send(line.as_bytes()).await {
                                let _ = errors_tx.try_send(TransportError::Io(e));
                            }
                        }
                        None => return,
                    },
                    _ = cancel.cancelled() => return,
                }
            }
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

#[cfg(test)]
#[path = "udp_test.rs"]
mod udp_test;
