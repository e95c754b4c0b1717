//! Syslog over TCP/TLS
//!
//! The TCP flavor wrapped in rustls. The peer is verified against the
//! system trust store merged with an optional CA PEM; mutual
//! authentication is enabled when a client cert+key pair is provided.
//! TLS material travels out-of-band via [`TlsClientSettings`], never in
//! the endpoint URL.

use std::sync::Arc;

use haul_protocol::{Endpoint, Record};
use rustls::pki_types::ServerName;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;

use super::tcp::{connect, run_egress};
use super::EGRESS_BUFFER;
use crate::{Transport, TransportError, ERRORS_BUFFER};

/// Environment variables pointing at PEM files for the TLS client side.
const CA_ENV: &str = "HAUL_TLS_CA";
const CERT_ENV: &str = "HAUL_TLS_CERT";
const KEY_ENV: &str = "HAUL_TLS_KEY";

/// Client-side TLS material, supplied out-of-band.
#[derive(Debug, Clone, Default)]
pub struct TlsClientSettings {
    /// Extra trust anchors, merged with the system store.
    pub ca_pem: Option<String>,

    /// Client certificate chain for mutual auth.
    pub cert_pem: Option<String>,

    /// Client private key for mutual auth.
    pub key_pem: Option<String>,
}

impl TlsClientSettings {
    /// Read PEM files named by `HAUL_TLS_CA` / `HAUL_TLS_CERT` /
    /// `HAUL_TLS_KEY`. Unset variables leave the field empty; unreadable
    /// files are logged and skipped.
    pub fn from_env() -> Self {
        let read = |var: &str| {
            let path = std::env::var(var).ok()?;
            match std::fs::read_to_string(&path) {
                Ok(pem) => Some(pem),
                Err(e) => {
                    tracing::warn!(var = %var, path = %path, error = %e, "unreadable pem file");
                    None
                }
            }
        };
        Self {
            ca_pem: read(CA_ENV),
            cert_pem: read(CERT_ENV),
            key_pem: read(KEY_ENV),
        }
    }

    /// Build the rustls client config: system roots merged with the CA
    /// PEM, client auth when a cert+key pair is present.
    pub fn client_config(&self) -> Result<rustls::ClientConfig, TransportError> {
        // Other TLS stacks in the process may compile in a second
        // crypto provider; pin the process default once.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            // Individual unparseable system certs are not fatal.
            let _ = roots.add(cert);
        }
        if let Some(ca) = &self.ca_pem {
            for cert in rustls_pemfile::certs(&mut ca.as_bytes()) {
                let cert = cert.map_err(TransportError::tls)?;
                roots.add(cert).map_err(TransportError::tls)?;
            }
        }

        let builder = rustls::ClientConfig::builder().with_root_certificates(roots);
        match (&self.cert_pem, &self.key_pem) {
            (Some(cert), Some(key)) => {
                let certs = rustls_pemfile::certs(&mut cert.as_bytes())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(TransportError::tls)?;
                let key = rustls_pemfile::private_key(&mut key.as_bytes())
                    .map_err(TransportError::tls)?
                    .ok_or_else(|| TransportError::Tls("no private key in pem".into()))?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(TransportError::tls)
            }
            _ => Ok(builder.with_no_client_auth()),
        }
    }
}

/// Syslog-over-TLS transport.
pub struct SyslogTls {
    endpoint: Endpoint,
    settings: TlsClientSettings,
    records_tx: mpsc::Sender<Record>,
    records_rx: Option<mpsc::Receiver<Record>>,
    errors_tx: Option<mpsc::Sender<TransportError>>,
    errors_rx: Option<mpsc::Receiver<TransportError>>,
    cancel: CancellationToken,
}

impl SyslogTls {
    /// Create an undialed transport for `endpoint`.
    pub fn new(endpoint: Endpoint, settings: TlsClientSettings) -> Self {
        let (records_tx, records_rx) = mpsc::channel(EGRESS_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_BUFFER);
        Self {
            endpoint,
            settings,
            records_tx,
            records_rx: Some(records_rx),
            errors_tx: Some(errors_tx),
            errors_rx: Some(errors_rx),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Transport for SyslogTls {
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
        let connector = TlsConnector::from(Arc::new(self.settings.client_config()?));
        let server_name = ServerName::try_from(self.endpoint.host().to_string())
            .map_err(TransportError::tls)?;

        let stream = handshake(&connector, &server_name, &target).await?;

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let loop_target = target.clone();
            run_egress(loop_target, stream, rx, errors_tx, cancel, move || {
                let connector = connector.clone();
                let server_name = server_name.clone();
                let target = target.clone();
                async move { handshake(&connector, &server_name, &target).await }
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

/// Dial TCP and complete the TLS handshake.
async fn handshake(
    connector: &TlsConnector,
    server_name: &ServerName<'static>,
    target: &str,
) -> Result<tokio_rustls::client::TlsStream<tokio::net::TcpStream>, TransportError> {
    let tcp = connect(target).await?;
    connector
        .connect(server_name.clone(), tcp)
        .await
        .map_err(|e| TransportError::Tls(format!("handshake with {target}: {e}")))
}
