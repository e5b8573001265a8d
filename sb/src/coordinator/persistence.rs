//! Coalescing persistence queue
//!
//! Saves are keyed by document name. While a save for a name is pending,
//! newer payloads replace it. At most one writer task exists per name, so
//! writes for one document never overlap and land in submission order.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use settingsstore::{SettingsStore, StoreError};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use super::error::CoordinatorError;

/// Destination for coalesced document writes
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn write(&self, name: &str, payload: &str) -> Result<(), StoreError>;
}

/// Sink that writes through a [`SettingsStore`] on the blocking pool
pub struct StoreSink {
    store: SettingsStore,
}

impl StoreSink {
    pub fn new(store: SettingsStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PersistenceSink for StoreSink {
    async fn write(&self, name: &str, payload: &str) -> Result<(), StoreError> {
        debug!(%name, "StoreSink::write: called");
        let store = self.store.clone();
        let name = name.to_string();
        let payload = payload.to_string();
        tokio::task::spawn_blocking(move || store.write_document(&name, &payload))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

/// Resolves once the write carrying this payload, or a newer one that
/// replaced it, has finished
#[derive(Debug)]
pub struct SaveReceipt {
    rx: oneshot::Receiver<bool>,
}

impl SaveReceipt {
    /// `true` if the write succeeded
    pub async fn wait(self) -> bool {
        self.rx.await.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PersistenceStats {
    pub queued: u64,
    pub written: u64,
    pub coalesced: u64,
    pub failed: u64,
}

/// Called with the write outcome from the writer task
pub(crate) type CompletionHook = Box<dyn FnOnce(bool) + Send>;

enum Waiter {
    Receipt(oneshot::Sender<bool>),
    Hook(CompletionHook),
}

impl Waiter {
    fn complete(self, ok: bool) {
        match self {
            Self::Receipt(tx) => {
                let _ = tx.send(ok);
            }
            Self::Hook(hook) => hook(ok),
        }
    }
}

struct PendingWrite {
    payload: String,
    waiters: Vec<Waiter>,
}

#[derive(Default)]
struct QueueState {
    pending: HashMap<String, PendingWrite>,
    active: HashSet<String>,
    stats: PersistenceStats,
}

struct QueueInner {
    sink: Arc<dyn PersistenceSink>,
    window: Duration,
    /// Runtime current at construction, used when queueing from a plain thread
    runtime: Option<Handle>,
    state: Mutex<QueueState>,
    busy: watch::Sender<usize>,
}

impl QueueInner {
    fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone)]
pub(crate) struct PersistenceQueue {
    inner: Arc<QueueInner>,
}

impl PersistenceQueue {
    pub fn new(sink: Arc<dyn PersistenceSink>, window: Duration) -> Self {
        debug!(?window, "PersistenceQueue::new: called");
        let (busy, _) = watch::channel(0);
        Self {
            inner: Arc::new(QueueInner {
                sink,
                window,
                runtime: Handle::try_current().ok(),
                state: Mutex::new(QueueState::default()),
                busy,
            }),
        }
    }

    /// Queue a payload for `name`, replacing any pending one
    pub fn queue(&self, name: &str, payload: String) -> Result<SaveReceipt, CoordinatorError> {
        self.queue_with(name, payload, None)
    }

    /// Like [`queue`](Self::queue), also running `hook` once the write finishes
    ///
    /// Nothing is queued when no runtime is reachable from this thread.
    pub fn queue_with(
        &self,
        name: &str,
        payload: String,
        hook: Option<CompletionHook>,
    ) -> Result<SaveReceipt, CoordinatorError> {
        debug!(%name, bytes = payload.len(), "PersistenceQueue::queue_with: called");
        let runtime = Handle::try_current()
            .ok()
            .or_else(|| self.inner.runtime.clone())
            .ok_or(CoordinatorError::NoRuntime)?;

        // Hooks complete before receipts so a resolved receipt sees their effects
        let (tx, rx) = oneshot::channel();
        let mut waiters: Vec<Waiter> = hook.map(Waiter::Hook).into_iter().collect();
        waiters.push(Waiter::Receipt(tx));
        let spawn_writer = {
            let mut state = self.inner.state();
            state.stats.queued += 1;
            let coalesced = match state.pending.get_mut(name) {
                Some(pending) => {
                    pending.payload = payload;
                    pending.waiters.extend(waiters);
                    true
                }
                None => {
                    state.pending.insert(name.to_string(), PendingWrite { payload, waiters });
                    false
                }
            };
            if coalesced {
                debug!(%name, "PersistenceQueue::queue_with: replaced pending payload");
                state.stats.coalesced += 1;
            }
            let spawn = state.active.insert(name.to_string());
            if spawn {
                self.inner.busy.send_modify(|n| *n += 1);
            }
            spawn
        };

        if spawn_writer {
            let inner = self.inner.clone();
            let name = name.to_string();
            runtime.spawn(run_writer(inner, name));
        }

        Ok(SaveReceipt { rx })
    }

    /// Wait until nothing is pending or being written
    pub async fn flush(&self) {
        debug!("PersistenceQueue::flush: called");
        let mut rx = self.inner.busy.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn stats(&self) -> PersistenceStats {
        self.inner.state().stats
    }
}

async fn run_writer(inner: Arc<QueueInner>, name: String) {
    debug!(%name, "run_writer: started");
    loop {
        tokio::time::sleep(inner.window).await;

        let pending = {
            let mut state = inner.state();
            match state.pending.remove(&name) {
                Some(pending) => pending,
                None => {
                    state.active.remove(&name);
                    break;
                }
            }
        };

        let ok = match inner.sink.write(&name, &pending.payload).await {
            Ok(()) => {
                debug!(%name, waiters = pending.waiters.len(), "run_writer: write complete");
                inner.state().stats.written += 1;
                true
            }
            Err(e) => {
                warn!(%name, error = %e, "Failed to persist document");
                inner.state().stats.failed += 1;
                false
            }
        };

        for waiter in pending.waiters {
            waiter.complete(ok);
        }
    }
    inner.busy.send_modify(|n| *n = n.saturating_sub(1));
    debug!(%name, "run_writer: finished");
}
