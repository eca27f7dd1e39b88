//! src/sync/mod.rs
//!
//! Asynchronous, best-effort replication of aggregate state to the secondary
//! read store. Spawns a worker task that buffers sync items, flushes them in
//! bounded batches with a pause in between, and drains the queue on shutdown.
//! Failures are logged and counted, never propagated: a replica outage must
//! not touch the primary write path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use convobot_common::models::sync::{SyncItem, SyncStatsSnapshot};
use convobot_common::traits::collaborator_traits::MirrorStore;
use crate::Error;

#[derive(Debug, Clone)]
pub struct MirrorSyncConfig {
    /// Bounded queue between the write path and the worker. When full, new
    /// items are dropped (and counted) rather than blocking ingestion.
    pub queue_capacity: usize,
    /// Maximum items per physical flush to the secondary store.
    pub batch_size: usize,
    /// Periodic flush interval for partially filled buffers.
    pub flush_interval: Duration,
    /// Pause between consecutive batches so the secondary store is never
    /// hammered by a backlog drain.
    pub batch_pause: Duration,
}

impl Default for MirrorSyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            flush_interval: Duration::from_secs(2),
            batch_pause: Duration::from_millis(50),
        }
    }
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Handle on the replication worker. Cheap to clone via `Arc`.
pub struct MirrorSyncPipeline {
    tx: mpsc::Sender<SyncItem>,
    counters: Arc<Counters>,
    store: Arc<dyn MirrorStore>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MirrorSyncPipeline {
    /// Spawns the worker task and returns the pipeline handle.
    pub fn spawn(store: Arc<dyn MirrorStore>, config: MirrorSyncConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let worker = tokio::spawn(run_worker(
            rx,
            shutdown_rx,
            Arc::clone(&store),
            Arc::clone(&counters),
            config.clone(),
        ));
        info!(
            "mirror sync pipeline started (batch={} pause={:?})",
            config.batch_size, config.batch_pause
        );

        Arc::new(Self {
            tx,
            counters,
            store,
            shutdown_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Fire-and-forget hand-off from the primary write path. Never blocks
    /// beyond a bounded try-send and never returns an error.
    pub fn enqueue(&self, item: SyncItem) {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(item)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("mirror sync queue full, dropping {} item", item.kind());
            }
            Err(mpsc::error::TrySendError::Closed(item)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "mirror sync pipeline already stopped, dropping {} item",
                    item.kind()
                );
            }
        }
    }

    pub fn stats(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Liveness of the secondary store itself, for health checks.
    pub async fn ping_store(&self) -> Result<(), Error> {
        self.store.ping().await
    }

    /// Signals the worker, waits for the final drain and flush.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("mirror sync worker join error: {:?}", e);
            }
        }
        info!("mirror sync pipeline stopped: {:?}", self.stats());
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<SyncItem>,
    mut shutdown_rx: watch::Receiver<bool>,
    store: Arc<dyn MirrorStore>,
    counters: Arc<Counters>,
    config: MirrorSyncConfig,
) {
    let mut buffer: Vec<SyncItem> = Vec::with_capacity(config.batch_size);
    let mut last_flush = Instant::now();

    loop {
        tokio::select! {
            biased;
            maybe_item = rx.recv() => {
                match maybe_item {
                    Some(item) => {
                        buffer.push(item);
                        if buffer.len() >= config.batch_size {
                            flush(&store, &counters, &mut buffer, &config).await;
                            last_flush = Instant::now();
                        }
                    }
                    None => {
                        info!("mirror sync channel closed, stopping worker");
                        break;
                    }
                }
            },
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("mirror sync worker shutting down");
                    break;
                }
            },
            _ = sleep(config.flush_interval) => {
                if !buffer.is_empty() && last_flush.elapsed() >= config.flush_interval {
                    flush(&store, &counters, &mut buffer, &config).await;
                    last_flush = Instant::now();
                }
            }
        }
    }

    // Drain whatever is still queued, then one final flush.
    while let Ok(item) = rx.try_recv() {
        buffer.push(item);
    }
    if !buffer.is_empty() {
        debug!("mirror sync final flush of {} items", buffer.len());
        flush(&store, &counters, &mut buffer, &config).await;
    }
}

/// Pushes the buffer to the secondary store in `batch_size` chunks. Each
/// item's outcome is independent; a failed item is counted and logged while
/// the rest of the batch proceeds.
async fn flush(
    store: &Arc<dyn MirrorStore>,
    counters: &Counters,
    buffer: &mut Vec<SyncItem>,
    config: &MirrorSyncConfig,
) {
    let items = std::mem::take(buffer);
    let mut first_chunk = true;
    for chunk in items.chunks(config.batch_size) {
        if !first_chunk {
            sleep(config.batch_pause).await;
        }
        first_chunk = false;

        for item in chunk {
            let outcome = match item {
                SyncItem::Profile(profile) => store.upsert_profile(profile).await,
                SyncItem::Message {
                    conversation_id,
                    message,
                } => store.insert_message(conversation_id, message).await,
            };
            match outcome {
                Ok(()) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("mirror sync of {} item failed: {:?}", item.kind(), e);
                }
            }
        }
    }
}
