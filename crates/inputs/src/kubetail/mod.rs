//! Container-log file-tail input
//!
//! Watches a directory of container log files (one per container, named
//! by the runtime's `<pod>_<namespace>_<container>-<id>.log` grammar),
//! tails each file, parses the JSON line format, and emits records with
//! the hostname/tag derived from the orchestrator.
//!
//! # Lifecycle
//!
//! On dial, the directory is scanned and every matching file is tailed
//! from its end, so a restart does not rebroadcast history. Create
//! events tail the new file from its start; remove events stop that
//! file's tailer; the directory watcher itself keeps running across
//! removes. Per-file parse failures are counted on the file's watcher
//! entry and never surfaced - one corrupted file must not poison the
//! input.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use haul_protocol::Record;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::InputError;

mod filename;
pub mod hostname;
mod tailer;

use tailer::Tailer;

/// Selects app-platform hostname/tag derivation process-wide when set
/// to `true`. Read once at input creation.
pub const APP_PLATFORM_ENV: &str = "HAUL_APP_PLATFORM";

/// Where the runtime writes container logs.
const DEFAULT_LOG_PATH: &str = "/var/log/containers";

/// Record stream capacity.
const RECORDS_BUFFER: usize = 100;

/// Error stream capacity; producers drop on overflow.
const ERRORS_BUFFER: usize = 16;

/// Configuration for the file-tail input.
#[derive(Debug, Clone)]
pub struct KubeTailConfig {
    /// Directory of container log files.
    pub path: PathBuf,

    /// App-platform derivation mode (see [`hostname`]).
    pub app_platform: bool,
}

impl Default for KubeTailConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_LOG_PATH.into(),
            app_platform: std::env::var(APP_PLATFORM_ENV).is_ok_and(|v| v == "true"),
        }
    }
}

/// Tailer bookkeeping for one watched file.
struct FileWatcher {
    hostname: String,
    tag: String,
    parse_errors: Arc<AtomicU64>,
    cancel: CancellationToken,
}

/// State shared with the directory-event task and tailers.
struct TailContext {
    client: Option<kube::Client>,
    app_platform: bool,
    watchers: Mutex<HashMap<PathBuf, FileWatcher>>,
    cancel: CancellationToken,
    closing: AtomicBool,
}

/// The container-log file-tail input.
pub struct KubeTail {
    config: KubeTailConfig,
    ctx: Arc<TailContext>,
    records_tx: Option<mpsc::Sender<Record>>,
    records_rx: Option<mpsc::Receiver<Record>>,
    errors_tx: Option<mpsc::Sender<InputError>>,
    errors_rx: Option<mpsc::Receiver<InputError>>,
    watcher: Option<RecommendedWatcher>,
}

impl KubeTail {
    /// Create an idle input. `client` is the orchestrator handle;
    /// without one, hostname/tag derive purely from pod names.
    pub fn new(config: KubeTailConfig, client: Option<kube::Client>) -> Self {
        let (records_tx, records_rx) = mpsc::channel(RECORDS_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_BUFFER);
        Self {
            ctx: Arc::new(TailContext {
                client,
                app_platform: config.app_platform,
                watchers: Mutex::new(HashMap::new()),
                cancel: CancellationToken::new(),
                closing: AtomicBool::new(false),
            }),
            config,
            records_tx: Some(records_tx),
            records_rx: Some(records_rx),
            errors_tx: Some(errors_tx),
            errors_rx: Some(errors_rx),
            watcher: None,
        }
    }

    /// Scan the directory, tail every matching file from its end, and
    /// subscribe to create/remove events.
    pub async fn dial(&mut self) -> Result<(), InputError> {
        if self.watcher.is_some() {
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

        let mut startup = Vec::new();
        for entry in std::fs::read_dir(&self.config.path)?.flatten() {
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                startup.push(entry.path());
            }
        }
        for path in startup {
            add(&self.ctx, &records_tx, path, true).await;
        }

        // Bridge notify's sync callback into the async event loop.
        let (event_tx, event_rx) = mpsc::channel(128);
        let mut watcher = RecommendedWatcher::new(
            move |result| {
                let _ = event_tx.blocking_send(result);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.config.path, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);

        tokio::spawn(event_loop(
            Arc::clone(&self.ctx),
            records_tx,
            errors_tx,
            event_rx,
        ));

        tracing::info!(path = %self.config.path.display(), "file-tail input open");
        Ok(())
    }

    /// Take the record stream. Yields once.
    pub fn records(&mut self) -> Option<mpsc::Receiver<Record>> {
        self.records_rx.take()
    }

    /// Take the error stream. Yields once.
    pub fn errors(&mut self) -> Option<mpsc::Receiver<InputError>> {
        self.errors_rx.take()
    }

    /// Paths currently tailed.
    pub async fn watched_paths(&self) -> Vec<PathBuf> {
        self.ctx.watchers.lock().await.keys().cloned().collect()
    }

    /// Parse failures counted against one watched file.
    pub async fn parse_errors(&self, path: &std::path::Path) -> Option<u64> {
        self.ctx
            .watchers
            .lock()
            .await
            .get(path)
            .map(|w| w.parse_errors.load(Ordering::Relaxed))
    }

    /// Stop the directory watcher and every tailer, and close the
    /// record and error streams. Idempotent.
    pub async fn close(&mut self) -> Result<(), InputError> {
        self.ctx.closing.store(true, Ordering::Release);
        self.ctx.cancel.cancel();
        self.watcher = None;
        self.records_tx = None;
        self.errors_tx = None;
        self.ctx.watchers.lock().await.clear();
        Ok(())
    }
}

/// Start tailing one file, if its name matches the grammar.
async fn add(
    ctx: &Arc<TailContext>,
    records_tx: &mpsc::Sender<Record>,
    path: PathBuf,
    seek_to_end: bool,
) {
    let Some(details) = filename::parse(&path) else {
        return;
    };
    {
        let watchers = ctx.watchers.lock().await;
        if watchers.contains_key(&path) {
            return;
        }
    }

    let derived = hostname::resolve(
        ctx.client.as_ref(),
        &details.namespace,
        &details.pod,
        ctx.app_platform,
    )
    .await;

    let parse_errors = Arc::new(AtomicU64::new(0));
    let cancel = ctx.cancel.child_token();
    let tailer = Tailer::new(
        path.clone(),
        derived.hostname.clone(),
        derived.tag.clone(),
        seek_to_end,
        Arc::clone(&parse_errors),
        records_tx.clone(),
    );

    tracing::info!(
        path = %path.display(),
        hostname = %derived.hostname,
        tag = %derived.tag,
        "tailing container log"
    );

    ctx.watchers.lock().await.insert(
        path,
        FileWatcher {
            hostname: derived.hostname,
            tag: derived.tag,
            parse_errors,
            cancel: cancel.clone(),
        },
    );
    tokio::spawn(tailer.run(cancel));
}

/// Directory event loop: creates tailers for new files, stops them on
/// remove, and keeps watching across both.
async fn event_loop(
    ctx: Arc<TailContext>,
    records_tx: mpsc::Sender<Record>,
    errors_tx: mpsc::Sender<InputError>,
    mut events: mpsc::Receiver<Result<notify::Event, notify::Error>>,
) {
    loop {
        tokio::select! {
            maybe = events.recv() => match maybe {
                Some(Ok(event)) => match event.kind {
                    EventKind::Create(_) => {
                        // A genuinely new file: read it from the start.
                        for path in event.paths {
                            add(&ctx, &records_tx, path, false).await;
                        }
                    }
                    EventKind::Remove(_) => {
                        for path in &event.paths {
                            let mut watchers = ctx.watchers.lock().await;
                            if let Some(watcher) = watchers.remove(path) {
                                watcher.cancel.cancel();
                                tracing::info!(
                                    path = %path.display(),
                                    hostname = %watcher.hostname,
                                    tag = %watcher.tag,
                                    errors = watcher.parse_errors.load(Ordering::Relaxed),
                                    "container log removed, tailer stopped"
                                );
                            }
                        }
                    }
                    _ => {}
                },
                Some(Err(e)) => {
                    if !ctx.closing.load(Ordering::Acquire) {
                        let _ = errors_tx.try_send(InputError::from(e));
                    }
                }
                None => return,
            },
            _ = ctx.cancel.cancelled() => return,
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
