//! Syslog over HTTP
//!
//! Behind `syslog+http[s]://` and plain `http[s]://`. Rendered RFC5424
//! lines are buffered in memory and POSTed as an `application/syslog`
//! body once per flush interval, and once more on close. The HTTP client
//! multiplexes, so `pools()` = true and the owning drain keeps a single
//! connection.

use std::time::Duration;

use haul_protocol::{Endpoint, Record};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;

use super::render_rfc5424;
use crate::{Transport, TransportError, ERRORS_BUFFER};

/// Flush cadence for buffered bodies.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Egress channel capacity.
const EGRESS_BUFFER: usize = 64;

/// Syslog-over-HTTP transport.
pub struct SyslogHttp {
    endpoint: Endpoint,
    records_tx: mpsc::Sender<Record>,
    records_rx: Option<mpsc::Receiver<Record>>,
    errors_tx: Option<mpsc::Sender<TransportError>>,
    errors_rx: Option<mpsc::Receiver<TransportError>>,
    cancel: CancellationToken,
}

impl SyslogHttp {
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
impl Transport for SyslogHttp {
    async fn dial(&mut self) -> Result<(), TransportError> {
        let mut rx = self
            .records_rx
            .take()
            .ok_or(TransportError::State("dial may only be called once"))?;
        let errors_tx = self
            .errors_tx
            .take()
            .ok_or(TransportError::State("dial may only be called once"))?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(TransportError::Request)?;
        let url = self.endpoint.http_url();
        let username = self.endpoint.username().to_string();
        let password = self.endpoint.password().map(str::to_string);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut flush = tokio::time::interval(FLUSH_INTERVAL);
            let mut body = String::new();
            loop {
                tokio::select! {
                    maybe = rx.recv() => match maybe {
                        Some(record) => {
                            body.push_str(&render_rfc5424(&record));
                            body.push('\n');
                        }
                        None => break,
                    },
                    _ = flush.tick() => {
                        if !body.is_empty() {
                            post(&client, &url, &username, password.as_deref(),
                                 std::mem::take(&mut body), &errors_tx).await;
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            // Drain whatever is still queued, then flush, so close never
            // strands a partial batch.
            while let Ok(record) = rx.try_recv() {
                body.push_str(&render_rfc5424(&record));
                body.push('\n');
            }
            if !body.is_empty() {
                post(&client, &url, &username, password.as_deref(), body, &errors_tx).await;
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
        true
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.cancel.cancel();
        Ok(())
    }
}

/// POST one body, surfacing failures on the error stream.
async fn post(
    client: &reqwest::Client,
    url: &str,
    username: &str,
    password: Option<&str>,
    body: String,
    errors: &mpsc::Sender<TransportError>,
) {
    let mut request = client
        .post(url)
        .header(CONTENT_TYPE, "application/syslog")
        .body(body);
    if let Some(password) = password {
        request = request.basic_auth(username, Some(password));
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let err = match status.as_u16() {
                    401 | 403 => TransportError::Auth(format!("{url} returned {status}")),
                    code => TransportError::Http { status: code, body },
                };
                let _ = errors.try_send(err);
            }
        }
        Err(e) => {
            let _ = errors.try_send(TransportError::Request(e));
        }
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;
