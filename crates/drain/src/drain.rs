//! The per-endpoint pool manager and dispatcher
//!
//! Lifecycle: `New -> Open (dial) -> Closed (close)`, with a transient
//! `Growing` overlap while an async connect is in flight. The connection
//! list and its length (the open count) are mutated only under the pool
//! mutex; `sent`, `errors` and `pressure` are written by single tasks
//! and read without synchronization.
//!
//! The dispatch critical section spans policy index computation, the
//! enqueue onto the selected connection, and the pressure update, so the
//! computed index stays valid for the pool snapshot it was computed
//! against. Growth dials happen outside the lock and append under it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use haul_protocol::{Endpoint, Record};
use haul_transports::Transport;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::DrainError;
use crate::metrics::{DrainMetrics, DrainMetricsHandle, DrainMetricsSnapshot};

/// Ingress buffer capacity: records held in memory while downstream
/// keeps up. A full buffer blocks producers.
pub const INGRESS_BUFFER: usize = 512;

/// Hard cap on `max_connections`.
pub const MAX_POOL_CAP: u32 = 1024;

/// Smoothed-pressure threshold above which the pool grows.
const GROW_PRESSURE: f64 = 0.5;

/// Capacity of the drain's error stream; producers drop on overflow.
const ERRORS_BUFFER: usize = 16;

/// How long dispatch waits for the pool floor to be restored when every
/// connection is gone.
const EMPTY_POOL_BACKOFF: Duration = Duration::from_millis(10);

/// Distribution policy, latched once at dial from `pools()` and the
/// sticky flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    RoundRobin,
    Sticky,
    Pooled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Open,
    Closed,
}

/// One pooled transport connection.
struct Connection {
    id: u64,
    records: mpsc::Sender<Record>,
    transport: Box<dyn Transport>,
}

/// State shared between the drain handle and its tasks.
struct Shared {
    endpoint: Endpoint,
    max_connections: u32,
    pool: Mutex<Vec<Connection>>,
    metrics: Arc<DrainMetrics>,
    errors_tx: mpsc::Sender<DrainError>,
    input_tx: mpsc::Sender<Record>,
    cancel: CancellationToken,
    closing: AtomicBool,
    growing: AtomicBool,
    next_conn_id: AtomicU64,
}

/// Per-endpoint pool manager. See the crate docs for the model.
pub struct Drain {
    shared: Arc<Shared>,
    sticky: bool,
    state: State,
    input_rx: Option<mpsc::Receiver<Record>>,
    errors_rx: Option<mpsc::Receiver<DrainError>>,
}

impl std::fmt::Debug for Drain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drain")
            .field("endpoint", &self.shared.endpoint)
            .field("sticky", &self.sticky)
            .field("state", &self.state)
            .finish()
    }
}

impl Drain {
    /// Validate the endpoint and bounds and build an idle drain. No
    /// network I/O happens here.
    pub fn create(endpoint: &str, max_connections: u32, sticky: bool) -> Result<Self, DrainError> {
        if max_connections == 0 {
            return Err(DrainError::Config("max connections must not be 0".into()));
        }
        if max_connections > MAX_POOL_CAP {
            return Err(DrainError::Config(format!(
                "max connections must not be more than {MAX_POOL_CAP}"
            )));
        }
        let endpoint = Endpoint::parse(endpoint)?;

        let (input_tx, input_rx) = mpsc::channel(INGRESS_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_BUFFER);

        Ok(Self {
            shared: Arc::new(Shared {
                endpoint,
                max_connections,
                pool: Mutex::new(Vec::new()),
                metrics: Arc::new(DrainMetrics::new(max_connections)),
                errors_tx,
                input_tx,
                cancel: CancellationToken::new(),
                closing: AtomicBool::new(false),
                growing: AtomicBool::new(false),
                next_conn_id: AtomicU64::new(0),
            }),
            sticky,
            state: State::New,
            input_rx: Some(input_rx),
            errors_rx: Some(errors_rx),
        })
    }

    /// Dial the first connection, latch the distribution policy, and
    /// start the dispatch loop.
    pub async fn dial(&mut self) -> Result<(), DrainError> {
        match self.state {
            State::Open => return Err(DrainError::State("dial may only be called once")),
            State::Closed => return Err(DrainError::State("dial after close")),
            State::New => {}
        }
        tracing::debug!(endpoint = %self.shared.endpoint, "dialing drain");

        let pools = Shared::connect(&self.shared).await?;
        self.state = State::Open;

        let policy = if pools {
            Policy::Pooled
        } else if self.sticky {
            Policy::Sticky
        } else {
            Policy::RoundRobin
        };

        let rx = self
            .input_rx
            .take()
            .ok_or(DrainError::State("dispatch loop already started"))?;
        let shared = Arc::clone(&self.shared);
        match policy {
            Policy::RoundRobin => tokio::spawn(run_round_robin(shared, rx)),
            Policy::Sticky => tokio::spawn(run_sticky(shared, rx)),
            Policy::Pooled => tokio::spawn(run_pooled(shared, rx)),
        };

        tracing::info!(
            endpoint = %self.shared.endpoint,
            policy = ?policy,
            max_connections = self.shared.max_connections,
            "drain open"
        );
        Ok(())
    }

    /// Sender half of the drain's ingress buffer.
    pub fn input(&self) -> mpsc::Sender<Record> {
        self.shared.input_tx.clone()
    }

    /// Take the drain's error stream. Yields once.
    pub fn errors(&mut self) -> Option<mpsc::Receiver<DrainError>> {
        self.errors_rx.take()
    }

    /// The endpoint this drain ships to.
    pub fn endpoint(&self) -> &str {
        self.shared.endpoint.as_str()
    }

    /// Cloneable read handle on this drain's metrics.
    pub fn metrics_handle(&self) -> DrainMetricsHandle {
        DrainMetricsHandle::new(
            self.shared.endpoint.as_str().to_string(),
            Arc::clone(&self.shared.metrics),
        )
    }

    /// Current counter values.
    pub fn metrics(&self) -> DrainMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Zero `sent` and `errors`, leaving pressure and the open count.
    pub fn reset_metrics(&self) {
        self.shared.metrics.reset();
    }

    /// Stop dispatch, close every connection, and empty the pool.
    /// Terminal: `dial` cannot be called again. Idempotent - a second
    /// close is a no-op returning Ok. Returns the last connection close
    /// error, if any.
    pub async fn close(&mut self) -> Result<(), DrainError> {
        if self.state == State::Closed {
            return Ok(());
        }
        self.state = State::Closed;
        tracing::debug!(endpoint = %self.shared.endpoint, "closing drain");

        self.shared.closing.store(true, Ordering::Release);
        self.shared.cancel.cancel();

        let mut pool = self.shared.pool.lock().await;
        let mut last_err = None;
        for mut conn in pool.drain(..) {
            if let Err(e) = conn.transport.close().await {
                tracing::debug!(endpoint = %self.shared.endpoint, error = %e, "connection close failed");
                last_err = Some(e);
            }
        }
        self.shared.metrics.set_open(0);
        drop(pool);

        match last_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl Shared {
    /// Create, dial, and pool one more connection. Returns the
    /// transport's `pools()` capability. The dial happens outside the
    /// pool lock so dispatch keeps flowing on existing connections.
    fn connect<'a>(
        shared: &'a Arc<Self>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, DrainError>> + Send + 'a>> {
        Box::pin(async move {
            let mut transport = haul_transports::create(&shared.endpoint);
            transport.dial().await?;
            let pools = transport.pools();
            let errors_rx = transport.errors();
            let records = transport.records();

            let mut pool = shared.pool.lock().await;
            if shared.closing.load(Ordering::Acquire)
                || pool.len() >= shared.max_connections as usize
            {
                drop(pool);
                let _ = transport.close().await;
                return Ok(pools);
            }

            let id = shared.next_conn_id.fetch_add(1, Ordering::Relaxed);
            pool.push(Connection {
                id,
                records,
                transport,
            });
            shared.metrics.set_open(pool.len() as u32);
            tracing::debug!(
                endpoint = %shared.endpoint,
                open = pool.len(),
                "opened connection"
            );
            drop(pool);

            if let Some(errors_rx) = errors_rx {
                tokio::spawn(Self::monitor(Arc::clone(shared), id, errors_rx));
            }
            Ok(pools)
        })
    }

    /// Watch one connection's error stream; count and surface errors,
    /// and shrink the pool when the stream closes.
    async fn monitor(
        shared: Arc<Self>,
        id: u64,
        mut errors_rx: mpsc::Receiver<haul_transports::TransportError>,
    ) {
        loop {
            tokio::select! {
                maybe = errors_rx.recv() => match maybe {
                    Some(err) => {
                        shared.metrics.record_error();
                        tracing::error!(endpoint = %shared.endpoint, error = %err, "transport error");
                        shared.surface(DrainError::Transport(err));
                    }
                    None => {
                        Self::remove_connection(&shared, id).await;
                        return;
                    }
                },
                _ = shared.cancel.cancelled() => return,
            }
        }
    }

    /// Drop a terminated connection. While the drain is open, a floor of
    /// one connection is maintained with an immediate reconnect; a
    /// failed reconnect is surfaced but never closes the drain.
    async fn remove_connection(shared: &Arc<Self>, id: u64) {
        if shared.closing.load(Ordering::Acquire) {
            return;
        }
        let mut pool = shared.pool.lock().await;
        let Some(pos) = pool.iter().position(|c| c.id == id) else {
            return;
        };
        let mut conn = pool.remove(pos);
        shared.metrics.set_open(pool.len() as u32);
        let emptied = pool.is_empty();
        drop(pool);

        let _ = conn.transport.close().await;
        tracing::warn!(
            endpoint = %shared.endpoint,
            "connection terminated, removed from pool"
        );

        if emptied && !shared.closing.load(Ordering::Acquire) {
            if let Err(e) = Self::connect(shared).await {
                tracing::error!(endpoint = %shared.endpoint, error = %e, "reconnect failed");
                shared.surface(e);
            }
        }
    }

    /// Dispatch one record: select a connection by `index`, enqueue
    /// under the pool lock, update the smoothed pressure, and maybe
    /// grow. `grow` is false under the transport-pooled policy.
    async fn dispatch<F>(shared: &Arc<Self>, record: Record, index: F, grow: bool)
    where
        F: Fn(u64, u32, &Record) -> usize,
    {
        loop {
            let pool = shared.pool.lock().await;
            let open = pool.len() as u32;
            if open == 0 {
                // Every connection is gone and the floor repair has not
                // landed yet. Hold the record rather than drop it.
                drop(pool);
                if shared.cancel.is_cancelled() {
                    return;
                }
                tokio::time::sleep(EMPTY_POOL_BACKOFF).await;
                continue;
            }

            let sent = shared.metrics.record_sent();
            let target = index(sent, open, &record);
            let sender = pool[target].records.clone();
            // Enqueue while holding the lock: the selected index must
            // stay valid for the pool snapshot it came from.
            let _ = sender.send(record).await;

            let fill = (INGRESS_BUFFER - shared.input_tx.capacity()) as f64 / INGRESS_BUFFER as f64;
            let pressure = (shared.metrics.pressure() + fill) / 2.0;
            shared.metrics.set_pressure(pressure);

            if grow
                && pressure > GROW_PRESSURE
                && open < shared.max_connections
                && !shared.growing.swap(true, Ordering::AcqRel)
            {
                tracing::debug!(
                    endpoint = %shared.endpoint,
                    open = open,
                    pressure = pressure,
                    "pressure high, growing pool"
                );
                let shared = Arc::clone(shared);
                tokio::spawn(async move {
                    if let Err(e) = Self::connect(&shared).await {
                        tracing::error!(endpoint = %shared.endpoint, error = %e, "pool growth failed");
                        shared.surface(e);
                    }
                    shared.growing.store(false, Ordering::Release);
                });
            }
            return;
        }
    }

    /// Surface an error on the drain's error stream; drop it when the
    /// stream is full or the drain is closing.
    fn surface(&self, err: DrainError) {
        if self.closing.load(Ordering::Acquire) {
            return;
        }
        let _ = self.errors_tx.try_send(err);
    }
}

// The dispatch loops are the critical path; the policy branch is pushed
// up to dial so no policy test runs per record.

async fn run_round_robin(shared: Arc<Shared>, mut rx: mpsc::Receiver<Record>) {
    let cancel = shared.cancel.clone();
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(record) => {
                    Shared::dispatch(
                        &shared,
                        record,
                        |sent, open, _: &Record| (sent % open as u64) as usize,
                        true,
                    )
                    .await;
                }
                None => return,
            },
            _ = cancel.cancelled() => return,
        }
    }
}

async fn run_sticky(shared: Arc<Shared>, mut rx: mpsc::Receiver<Record>) {
    let cancel = shared.cancel.clone();
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(record) => {
                    Shared::dispatch(&shared, record, sticky_index, true).await;
                }
                None => return,
            },
            _ = cancel.cancelled() => return,
        }
    }
}

async fn run_pooled(shared: Arc<Shared>, mut rx: mpsc::Receiver<Record>) {
    let cancel = shared.cancel.clone();
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(record) => {
                    Shared::dispatch(&shared, record, |_, _, _: &Record| 0, false).await;
                }
                None => return,
            },
            _ = cancel.cancelled() => return,
        }
    }
}

/// Sticky partition: crc32 of hostname and tag, modulo the pool size.
/// A given key lands on one connection as long as the pool is stable.
fn sticky_index(_sent: u64, open: u32, record: &Record) -> usize {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(record.hostname.as_bytes());
    hasher.update(record.tag.as_bytes());
    (hasher.finalize() % open) as usize
}

#[cfg(test)]
#[path = "drain_test.rs"]
mod drain_test;
