//! Search-index bulk transport
//!
//! Behind `elasticsearch…://` and `es…://`. Records accumulate in an
//! in-memory bulk body - two lines per record, an action line and a
//! document line - POSTed to the endpoint's `/_bulk` path once per flush
//! interval and once more on close. The HTTP client multiplexes, so
//! `pools()` = true.
//!
//! # Body shape
//!
//! ```text
//! {"create":{"_index":"<idx>","_id":"<unix-seconds>"}}
//! { "@timestamp":"<rfc5424>", "hostname":"<h>", "tag":"<t>", "message":"<m>", "severity":S, "facility":F }
//! ```
//!
//! The index is the `index=` query option when present, else the
//! process-wide node override, else the record hostname. Strings are
//! escaped with the family's fixed policy: `"` -> `\"`, LF -> `\n`,
//! CR -> `\r`, NUL dropped.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use haul_protocol::{AuthMode, Endpoint, Record};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;

use crate::{Transport, TransportError, ERRORS_BUFFER};

/// Selects app-platform behavior process-wide: bulk documents carry an
/// `"app_platform":"true"` field when set to `true`.
pub const APP_PLATFORM_ENV: &str = "HAUL_APP_PLATFORM";

/// Overrides the default bulk index (used when no `index=` option is
/// present) with a process-wide node identifier.
pub const NODE_ENV: &str = "HAUL_NODE";

/// Flush cadence for the bulk body.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Egress channel capacity.
const EGRESS_BUFFER: usize = 10;

/// Everything the egress task needs, captured once at dial.
struct BulkSession {
    client: reqwest::Client,
    url: String,
    username: String,
    password: Option<String>,
    auth: AuthMode,
    index: Option<String>,
    node: Option<String>,
    app_platform: bool,
}

/// Bulk-index transport.
pub struct SearchIndex {
    endpoint: Endpoint,
    node: Option<String>,
    app_platform: bool,
    records_tx: mpsc::Sender<Record>,
    records_rx: Option<mpsc::Receiver<Record>>,
    errors_tx: Option<mpsc::Sender<TransportError>>,
    errors_rx: Option<mpsc::Receiver<TransportError>>,
    cancel: CancellationToken,
}

impl SearchIndex {
    /// Create an undialed transport for `endpoint`. The process-wide
    /// flags are read here, once.
    pub fn new(endpoint: Endpoint) -> Self {
        let node = std::env::var(NODE_ENV).ok().filter(|v| !v.is_empty());
        let app_platform = std::env::var(APP_PLATFORM_ENV).is_ok_and(|v| v == "true");
        let (records_tx, records_rx) = mpsc::channel(EGRESS_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_BUFFER);
        Self {
            endpoint,
            node,
            app_platform,
            records_tx,
            records_rx: Some(records_rx),
            errors_tx: Some(errors_tx),
            errors_rx: Some(errors_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// The bulk URL: the endpoint path with `/_bulk` appended unless
    /// already present.
    fn bulk_url(&self) -> String {
        let url = self.endpoint.http_url();
        if url.ends_with("/_bulk") {
            url
        } else {
            format!("{}/_bulk", url.trim_end_matches('/'))
        }
    }
}

#[async_trait]
impl Transport for SearchIndex {
    async fn dial(&mut self) -> Result<(), TransportError> {
        let mut rx = self
            .records_rx
            .take()
            .ok_or(TransportError::State("dial may only be called once"))?;
        let errors_tx = self
            .errors_tx
            .take()
            .ok_or(TransportError::State("dial may only be called once"))?;

        let session = BulkSession {
            client: reqwest::Client::builder()
                .build()
                .map_err(TransportError::Request)?,
            url: self.bulk_url(),
            username: self.endpoint.username().to_string(),
            password: self.endpoint.password().map(str::to_string),
            auth: self.endpoint.auth_mode(),
            index: self.endpoint.index(),
            node: self.node.clone(),
            app_platform: self.app_platform,
        };
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut flush = tokio::time::interval(FLUSH_INTERVAL);
            let mut body = String::new();
            loop {
                tokio::select! {
                    maybe = rx.recv() => match maybe {
                        Some(record) => session.append(&mut body, &record),
                        None => break,
                    },
                    _ = flush.tick() => {
                        if !body.is_empty() {
                            session.post(std::mem::take(&mut body), &errors_tx).await;
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            // Drain whatever is still queued, then flush, so close never
            // loses the last batch.
            while let Ok(record) = rx.try_recv() {
                session.append(&mut body, &record);
            }
            if !body.is_empty() {
                session.post(body, &errors_tx).await;
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

impl BulkSession {
    /// Append the two bulk lines for one record.
    fn append(&self, body: &mut String, record: &Record) {
        let index = self
            .index
            .as_deref()
            .or(self.node.as_deref())
            .unwrap_or(&record.hostname);

        body.push_str(&format!(
            "{{\"create\":{{\"_index\":\"{}\",\"_id\":\"{}\"}}}}\n",
            escape(index),
            Utc::now().timestamp(),
        ));

        let system_tag = if self.app_platform {
            ", \"app_platform\":\"true\""
        } else {
            ""
        };
        body.push_str(&format!(
            "{{ \"@timestamp\":\"{}\", \"hostname\":\"{}\", \"tag\":\"{}\"{}, \"message\":\"{}\", \"severity\":{}, \"facility\":{} }}\n",
            record.rfc5424_time(),
            escape(&record.hostname),
            escape(&record.tag),
            system_tag,
            escape(&record.message),
            record.severity,
            record.facility,
        ));
    }

    /// POST one bulk body, surfacing failures on the error stream.
    async fn post(&self, body: String, errors: &mpsc::Sender<TransportError>) {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(password) = &self.password {
            let header = match self.auth {
                AuthMode::Basic => format!(
                    "Basic {}",
                    BASE64.encode(format!("{}:{}", self.username, password))
                ),
                AuthMode::Bearer => format!("Bearer {password}"),
                AuthMode::ApiKey => format!(
                    "ApiKey {}",
                    BASE64.encode(format!("{}:{}", self.username, password))
                ),
            };
            request = request.header(AUTHORIZATION, header);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    let err = match status.as_u16() {
                        401 | 403 => {
                            TransportError::Auth(format!("{} returned {}", self.url, status))
                        }
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
}

/// The family's fixed escape policy, applied to every string before it
/// is spliced into the bulk body.
fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => {}
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
#[path = "search_index_test.rs"]
mod search_index_test;
