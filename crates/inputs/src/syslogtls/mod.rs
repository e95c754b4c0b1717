//! Syslog-over-TLS network input
//!
//! A TLS listener accepting RFC6587 non-transparent (newline-delimited)
//! frames of RFC5424 syslog. Server identity comes from a cert+key PEM
//! pair; trust roots are the system store merged with an optional CA
//! PEM. Client certificates are optional - when one is presented, its
//! subject CN is extracted for connection-scoped logging.
//!
//! One acceptor task, one reader task per connection feeding a decoded-
//! message channel, and one conversion task turning decoded messages
//! into records with unset fields defaulted.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use haul_protocol::Record;
use rustls::server::WebPkiClientVerifier;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::InputError;

mod parser;

pub use parser::SyslogMessage;

/// Record stream capacity.
const RECORDS_BUFFER: usize = 100;

/// Decoded-message channel capacity.
const MESSAGES_BUFFER: usize = 100;

/// Error stream capacity; producers drop on overflow.
const ERRORS_BUFFER: usize = 16;

/// Longest accepted frame; longer lines are dropped.
const MAX_LINE: usize = 128 * 1024;

/// Configuration for the TLS listener.
#[derive(Debug, Clone)]
pub struct SyslogTlsConfig {
    /// Bind address, `host:port`.
    pub address: String,

    /// Our advertised identity, for logging.
    pub server_name: String,

    /// Server certificate chain PEM.
    pub cert_pem: String,

    /// Server private key PEM.
    pub key_pem: String,

    /// Extra trust anchors for client certificates, merged with the
    /// system store.
    pub ca_pem: Option<String>,
}

/// The syslog-over-TLS input.
pub struct SyslogTlsInput {
    config: SyslogTlsConfig,
    records_tx: Option<mpsc::Sender<Record>>,
    records_rx: Option<mpsc::Receiver<Record>>,
    errors_tx: Option<mpsc::Sender<InputError>>,
    errors_rx: Option<mpsc::Receiver<InputError>>,
    cancel: CancellationToken,
    closing: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    dialed: bool,
}

impl SyslogTlsInput {
    /// Create an idle input.
    pub fn new(config: SyslogTlsConfig) -> Self {
        let (records_tx, records_rx) = mpsc::channel(RECORDS_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_BUFFER);
        Self {
            config,
            records_tx: Some(records_tx),
            records_rx: Some(records_rx),
            errors_tx: Some(errors_tx),
            errors_rx: Some(errors_rx),
            cancel: CancellationToken::new(),
            closing: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            dialed: false,
        }
    }

    /// Build the rustls server config: our cert+key, client certs
    /// optional against system roots merged with the CA PEM.
    fn server_config(&self) -> Result<rustls::ServerConfig, InputError> {
        // Other TLS stacks in the process may compile in a second
        // crypto provider; pin the process default once.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let certs = rustls_pemfile::certs(&mut self.config.cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(InputError::tls)?;
        let key = rustls_pemfile::private_key(&mut self.config.key_pem.as_bytes())
            .map_err(InputError::tls)?
            .ok_or_else(|| InputError::Tls("no private key in pem".into()))?;

        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            let _ = roots.add(cert);
        }
        if let Some(ca) = &self.config.ca_pem {
            for cert in rustls_pemfile::certs(&mut ca.as_bytes()) {
                let cert = cert.map_err(InputError::tls)?;
                roots.add(cert).map_err(InputError::tls)?;
            }
        }

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .allow_unauthenticated()
            .build()
            .map_err(InputError::tls)?;

        rustls::ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(InputError::tls)
    }

    /// Bind the listener and start accepting framed syslog.
    pub async fn dial(&mut self) -> Result<(), InputError> {
        if self.dialed {
            return Err(InputError::State("dial may only be called once"));
        }
        let records_tx = self
            .records_tx
            .clone()
            .ok_or(InputError::State("dial after close"))?;
        let errors_tx = self
            .errors_tx
            .clone()
            .ok_or(InputError::State("dial after close"))?;

        let acceptor = TlsAcceptor::from(Arc::new(self.server_config()?));
        let listener = TcpListener::bind(&self.config.address).await?;
        self.local_addr = Some(listener.local_addr()?);
        self.dialed = true;

        let (msgs_tx, msgs_rx) = mpsc::channel(MESSAGES_BUFFER);

        tokio::spawn(accept_loop(
            listener,
            acceptor,
            msgs_tx,
            errors_tx,
            self.cancel.clone(),
            Arc::clone(&self.closing),
        ));
        tokio::spawn(convert_loop(msgs_rx, records_tx, self.cancel.clone()));

        tracing::info!(
            address = %self.config.address,
            server_name = %self.config.server_name,
            "syslog tls input open"
        );
        Ok(())
    }

    /// The bound address, once dialed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Take the record stream. Yields once.
    pub fn records(&mut self) -> Option<mpsc::Receiver<Record>> {
        self.records_rx.take()
    }

    /// Take the error stream. Yields once.
    pub fn errors(&mut self) -> Option<mpsc::Receiver<InputError>> {
        self.errors_rx.take()
    }

    /// Shut the listener, drain inbound messages, and close the record
    /// and error streams. Idempotent.
    pub async fn close(&mut self) -> Result<(), InputError> {
        self.closing.store(true, Ordering::Release);
        self.cancel.cancel();
        self.records_tx = None;
        self.errors_tx = None;
        Ok(())
    }
}

/// Accept connections until cancelled; one reader task per connection.
async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    msgs_tx: mpsc::Sender<SyslogMessage>,
    errors_tx: mpsc::Sender<InputError>,
    cancel: CancellationToken,
    closing: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tokio::spawn(read_connection(
                        socket,
                        peer,
                        acceptor.clone(),
                        msgs_tx.clone(),
                        errors_tx.clone(),
                        cancel.clone(),
                        Arc::clone(&closing),
                    ));
                }
                Err(e) => {
                    if closing.load(Ordering::Acquire) {
                        return;
                    }
                    let _ = errors_tx.try_send(InputError::Io(e));
                }
            },
            _ = cancel.cancelled() => return,
        }
    }
}

/// Handshake, then read newline-delimited frames until EOF or cancel.
async fn read_connection(
    socket: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    msgs_tx: mpsc::Sender<SyslogMessage>,
    errors_tx: mpsc::Sender<InputError>,
    cancel: CancellationToken,
    closing: Arc<AtomicBool>,
) {
    let stream = match acceptor.accept(socket).await {
        Ok(stream) => stream,
        Err(e) => {
            if !closing.load(Ordering::Acquire) {
                let _ = errors_tx.try_send(InputError::Tls(format!("handshake with {peer}: {e}")));
            }
            return;
        }
    };

    let peer_name = peer_common_name(&stream);
    tracing::debug!(
        peer = %peer,
        peer_name = peer_name.as_deref().unwrap_or(""),
        "syslog tls connection"
    );

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        tokio::select! {
            read = reader.read_line(&mut line) => match read {
                Ok(0) => return,
                Ok(_) => {
                    if line.len() > MAX_LINE || line.trim().is_empty() {
                        continue;
                    }
                    if msgs_tx.send(parser::parse(&line)).await.is_err() {
                        return;
                    }
                }
                Err(_) => return,
            },
            _ = cancel.cancelled() => return,
        }
    }
}

/// Subject CN of the first peer certificate, when one was presented.
fn peer_common_name(
    stream: &tokio_rustls::server::TlsStream<TcpStream>,
) -> Option<String> {
    let cert = stream.get_ref().1.peer_certificates()?.first()?;
    let (_, parsed) = X509Certificate::from_der(cert.as_ref()).ok()?;
    let cn = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);
    cn
}

/// Turn decoded messages into records, defaulting unset fields; the
/// timestamp defaults to "now".
async fn convert_loop(
    mut msgs_rx: mpsc::Receiver<SyslogMessage>,
    records_tx: mpsc::Sender<Record>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe = msgs_rx.recv() => match maybe {
                Some(msg) => {
                    if records_tx.send(to_record(msg)).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
            _ = cancel.cancelled() => {
                // Drain what already arrived, then let the stream close.
                while let Ok(msg) = msgs_rx.try_recv() {
                    if records_tx.try_send(to_record(msg)).is_err() {
                        return;
                    }
                }
                return;
            }
        }
    }
}

fn to_record(msg: SyslogMessage) -> Record {
    Record::new(
        msg.severity.unwrap_or(0),
        msg.facility.unwrap_or(0),
        msg.timestamp.unwrap_or_else(Utc::now),
        msg.hostname.unwrap_or_default(),
        msg.app_name.unwrap_or_default(),
        msg.message.unwrap_or_default(),
    )
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
