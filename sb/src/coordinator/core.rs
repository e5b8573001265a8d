//! Main Coordinator implementation

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use settingsstore::{SETTINGS_DOC, SettingsData, SettingsStore, StoreError};
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::error::CoordinatorError;
use super::messages::{ChangeSource, CoordinatorEvent, CoordinatorMetrics, TickReport};
use super::persistence::{CompletionHook, PersistenceQueue, PersistenceSink, SaveReceipt, StoreSink};
use super::registry::{Registry, SubscriberId};
use crate::widget::PeriodicSubscriber;

/// Cached settings snapshot
#[derive(Default)]
struct SettingsCache {
    snapshot: Option<Arc<SettingsData>>,
    loaded_at: Option<Instant>,
    /// Bumped by every `update_settings`
    generation: u64,
    /// Generation whose save has not succeeded yet; disk is stale while set
    unsaved: Option<u64>,
}

impl SettingsCache {
    /// Snapshot that can be served without touching disk
    fn fresh(&self, ttl: Duration) -> Option<Arc<SettingsData>> {
        let snapshot = self.snapshot.as_ref()?;
        if self.unsaved.is_some() {
            return Some(snapshot.clone());
        }
        match self.loaded_at {
            Some(loaded_at) if loaded_at.elapsed() < ttl => Some(snapshot.clone()),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    invocations: AtomicU64,
    failures: AtomicU64,
    skipped_in_flight: AtomicU64,
    reloads: AtomicU64,
    reload_failures: AtomicU64,
    settings_notifications: AtomicU64,
    http_clients_built: AtomicU64,
}

struct Shared {
    config: CoordinatorConfig,
    store: SettingsStore,
    cache: Mutex<SettingsCache>,
    /// Serializes disk reloads; never held together with `cache` across I/O
    reload_gate: Mutex<()>,
    registry: Mutex<Registry>,
    client: Mutex<Option<reqwest::Client>>,
    events: broadcast::Sender<CoordinatorEvent>,
    persistence: PersistenceQueue,
    counters: Counters,
    reloading: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

enum Outcome {
    Ok,
    Failed,
    Panicked,
}

/// Process-wide owner of the shared resources
///
/// Cheap to clone; every clone refers to the same state. Construct one in
/// the entry point and pass it to whatever needs it.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Create a coordinator persisting through `store`
    pub fn new(config: CoordinatorConfig, store: SettingsStore) -> Self {
        let sink = Arc::new(StoreSink::new(store.clone()));
        Self::with_sink(config, store, sink)
    }

    /// Create a coordinator with a custom persistence sink
    pub fn with_sink(config: CoordinatorConfig, store: SettingsStore, sink: Arc<dyn PersistenceSink>) -> Self {
        debug!(?config, dir = ?store.dir(), "Coordinator::with_sink: called");
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        let persistence = PersistenceQueue::new(sink, config.save_coalesce());
        Self {
            shared: Arc::new(Shared {
                config,
                store,
                cache: Mutex::new(SettingsCache::default()),
                reload_gate: Mutex::new(()),
                registry: Mutex::new(Registry::default()),
                client: Mutex::new(None),
                events,
                persistence,
                counters: Counters::default(),
                reloading: AtomicBool::new(false),
                shutdown_tx,
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    pub fn store(&self) -> &SettingsStore {
        &self.shared.store
    }

    fn is_shut_down(&self) -> bool {
        *self.shared.shutdown_tx.borrow()
    }

    /// Shared HTTP client, built on first use
    pub fn shared_client(&self) -> Result<reqwest::Client, CoordinatorError> {
        let mut client = lock(&self.shared.client);
        if let Some(existing) = client.as_ref() {
            return Ok(existing.clone());
        }
        debug!("Coordinator::shared_client: building client");
        let built = reqwest::Client::builder()
            .user_agent(self.shared.config.user_agent.as_str())
            .timeout(self.shared.config.http_timeout())
            .build()?;
        self.shared.counters.http_clients_built.fetch_add(1, Ordering::Relaxed);
        *client = Some(built.clone());
        Ok(built)
    }

    /// Current settings snapshot, reloading from disk if the cache is stale
    ///
    /// Never fails: a failed reload keeps the previous snapshot. While an
    /// `update_settings` save is pending or has failed, the cached snapshot
    /// is returned without reading disk.
    pub fn settings(&self) -> Arc<SettingsData> {
        let ttl = self.shared.config.settings_ttl();
        if let Some(snapshot) = lock(&self.shared.cache).fresh(ttl) {
            return snapshot;
        }

        let _gate = lock(&self.shared.reload_gate);
        let generation = {
            let cache = lock(&self.shared.cache);
            // Another caller may have reloaded while we waited on the gate
            if let Some(snapshot) = cache.fresh(ttl) {
                return snapshot;
            }
            cache.generation
        };
        let loaded = self.shared.store.load_settings();
        let mut cache = lock(&self.shared.cache);
        self.apply_reload(&mut cache, generation, loaded)
    }

    /// Async form of [`settings`](Self::settings); disk reloads run on the blocking pool
    pub async fn current_settings(&self) -> Arc<SettingsData> {
        if let Some(snapshot) = lock(&self.shared.cache).fresh(self.shared.config.settings_ttl()) {
            return snapshot;
        }
        let coordinator = self.clone();
        match tokio::task::spawn_blocking(move || coordinator.settings()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Settings reload task failed");
                lock(&self.shared.cache)
                    .snapshot
                    .clone()
                    .unwrap_or_else(|| Arc::new(SettingsData::default()))
            }
        }
    }

    /// Drop the freshness of the cache so the next read reloads
    pub fn invalidate_settings(&self) {
        debug!("Coordinator::invalidate_settings: called");
        lock(&self.shared.cache).loaded_at = None;
    }

    fn cache_expired(&self) -> bool {
        let cache = lock(&self.shared.cache);
        cache.snapshot.is_some() && cache.fresh(self.shared.config.settings_ttl()).is_none()
    }

    fn apply_reload(
        &self,
        cache: &mut SettingsCache,
        generation: u64,
        loaded: Result<SettingsData, StoreError>,
    ) -> Arc<SettingsData> {
        debug!(generation, "Coordinator::apply_reload: called");
        cache.loaded_at = Some(Instant::now());
        if (cache.generation != generation || cache.unsaved.is_some())
            && let Some(snapshot) = cache.snapshot.as_ref()
        {
            debug!("Coordinator::apply_reload: settings updated during reload, keeping cache");
            return snapshot.clone();
        }

        match loaded {
            Ok(loaded) => {
                self.shared.counters.reloads.fetch_add(1, Ordering::Relaxed);
                let fresh = Arc::new(loaded);
                let changed = match cache.snapshot.as_ref() {
                    Some(previous) => !previous.observable_eq(&fresh),
                    None => false,
                };
                cache.snapshot = Some(fresh.clone());
                if changed {
                    info!("Settings changed on disk");
                    self.notify_locked(fresh.clone(), ChangeSource::Reload);
                }
                fresh
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload settings, keeping cached snapshot");
                self.shared.counters.reload_failures.fetch_add(1, Ordering::Relaxed);
                cache
                    .snapshot
                    .get_or_insert_with(|| Arc::new(SettingsData::default()))
                    .clone()
            }
        }
    }

    /// Caller must hold the cache lock so notification order matches cache order
    fn notify_locked(&self, snapshot: Arc<SettingsData>, source: ChangeSource) {
        self.shared.counters.settings_notifications.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .shared
            .events
            .send(CoordinatorEvent::SettingsChanged { snapshot, source });
    }

    /// Replace the cached settings, persist them and notify listeners
    pub fn update_settings(&self, settings: SettingsData) -> Result<SaveReceipt, CoordinatorError> {
        debug!("Coordinator::update_settings: called");
        let snapshot = Arc::new(settings.corrected());
        let payload = serde_yaml::to_string(snapshot.as_ref())?;

        let mut cache = lock(&self.shared.cache);
        let generation = cache.generation + 1;
        let receipt = self
            .shared
            .persistence
            .queue_with(SETTINGS_DOC, payload, Some(self.saved_hook(generation)))?;
        cache.generation = generation;
        cache.unsaved = Some(generation);
        cache.snapshot = Some(snapshot.clone());
        cache.loaded_at = Some(Instant::now());
        self.notify_locked(snapshot, ChangeSource::Update);
        drop(cache);

        info!(generation, "Settings updated");
        Ok(receipt)
    }

    /// Clears the unsaved marker once the write for `generation` lands
    fn saved_hook(&self, generation: u64) -> CompletionHook {
        let shared = Arc::downgrade(&self.shared);
        Box::new(move |ok| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut cache = lock(&shared.cache);
            if ok && cache.unsaved == Some(generation) {
                debug!(generation, "Coordinator::saved_hook: settings persisted");
                cache.unsaved = None;
                cache.loaded_at = Some(Instant::now());
            } else if !ok {
                debug!(generation, "Coordinator::saved_hook: save failed, cache stays authoritative");
            }
        })
    }

    /// Queue a named document for a coalesced write
    pub fn queue_save(&self, name: &str, payload: impl Into<String>) -> Result<SaveReceipt, CoordinatorError> {
        self.shared.persistence.queue(name, payload.into())
    }

    /// Wait for every queued save to finish
    pub async fn flush(&self) {
        self.shared.persistence.flush().await;
    }

    /// Receive settings changes and master tick reports
    pub fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        debug!("Coordinator::subscribe_events: called");
        self.shared.events.subscribe()
    }

    /// Register a periodic subscriber
    ///
    /// Returns `Ok(false)` if this exact subscriber is already registered;
    /// the first interval is kept.
    pub fn subscribe(
        &self,
        subscriber: Arc<dyn PeriodicSubscriber>,
        interval: Duration,
    ) -> Result<bool, CoordinatorError> {
        debug!(name = subscriber.name(), ?interval, "Coordinator::subscribe: called");
        if interval.is_zero() {
            return Err(CoordinatorError::ZeroInterval(subscriber.name().to_string()));
        }
        if self.is_shut_down() {
            return Err(CoordinatorError::ShutDown);
        }
        let name = subscriber.name().to_string();
        let added = lock(&self.shared.registry).insert(subscriber, interval, Instant::now());
        if added {
            info!(%name, ?interval, "Subscriber registered");
        }
        Ok(added)
    }

    /// Remove a subscriber; unknown subscribers are ignored
    pub fn unsubscribe(&self, subscriber: &Arc<dyn PeriodicSubscriber>) -> bool {
        debug!(name = subscriber.name(), "Coordinator::unsubscribe: called");
        let removed = lock(&self.shared.registry).remove(SubscriberId::of(subscriber));
        if removed {
            info!(name = subscriber.name(), "Subscriber removed");
        }
        removed
    }

    pub fn is_subscribed(&self, subscriber: &Arc<dyn PeriodicSubscriber>) -> bool {
        lock(&self.shared.registry).contains(SubscriberId::of(subscriber))
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.registry).len()
    }

    /// Run one master tick as of `now`
    ///
    /// Every due subscriber runs as its own task; failures and panics are
    /// counted, never propagated. Returns once all of them have finished.
    pub async fn tick_at(&self, now: Instant) -> TickReport {
        let started = Instant::now();
        let (due, skipped) = lock(&self.shared.registry).take_due(now);
        debug!(due = due.len(), skipped, "Coordinator::tick_at: called");

        let ids: Vec<SubscriberId> = due.iter().map(|d| d.id).collect();
        let mut set = JoinSet::new();
        for dispatch in due {
            let subscriber = dispatch.subscriber;
            set.spawn(async move {
                let name = subscriber.name().to_string();
                match AssertUnwindSafe(subscriber.on_tick()).catch_unwind().await {
                    Ok(Ok(())) => Outcome::Ok,
                    Ok(Err(e)) => {
                        warn!(%name, error = %e, "Subscriber tick failed");
                        Outcome::Failed
                    }
                    Err(_) => {
                        warn!(%name, "Subscriber tick panicked");
                        Outcome::Panicked
                    }
                }
            });
        }

        let mut report = TickReport {
            dispatched: ids.len(),
            skipped_in_flight: skipped,
            ..Default::default()
        };
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Outcome::Ok) => report.succeeded += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Panicked) => report.panicked += 1,
                Err(e) => {
                    warn!(error = %e, "Subscriber task aborted");
                    report.panicked += 1;
                }
            }
        }

        {
            let mut registry = lock(&self.shared.registry);
            for id in ids {
                registry.finish(id);
            }
        }

        report.elapsed = started.elapsed();
        let counters = &self.shared.counters;
        counters.ticks.fetch_add(1, Ordering::Relaxed);
        counters.invocations.fetch_add(report.dispatched as u64, Ordering::Relaxed);
        counters.failures.fetch_add(report.failures() as u64, Ordering::Relaxed);
        counters.skipped_in_flight.fetch_add(skipped as u64, Ordering::Relaxed);

        let _ = self.shared.events.send(CoordinatorEvent::MasterTick(report.clone()));
        report
    }

    /// Start the master tick loop
    ///
    /// Each tick's dispatch runs as a separate task, so a hung subscriber
    /// delays only its own tick. Missed timer fires are skipped.
    pub fn spawn_master_tick(&self) -> Result<JoinHandle<()>, CoordinatorError> {
        debug!("Coordinator::spawn_master_tick: called");
        if self.is_shut_down() {
            return Err(CoordinatorError::ShutDown);
        }
        let coordinator = self.clone();
        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();
        let period = self.shared.config.tick_interval();

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(?period, "Master tick started");

            loop {
                tokio::select! {
                    fired = ticker.tick() => {
                        let dispatcher = coordinator.clone();
                        tokio::spawn(async move {
                            dispatcher.tick_at(fired).await;
                        });
                        coordinator.reload_in_background();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Master tick stopped");
        }))
    }

    fn reload_in_background(&self) {
        if !self.cache_expired() {
            return;
        }
        if self.shared.reloading.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Coordinator::reload_in_background: cache expired");
        let coordinator = self.clone();
        tokio::task::spawn_blocking(move || {
            coordinator.settings();
            coordinator.shared.reloading.store(false, Ordering::Release);
        });
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        let c = &self.shared.counters;
        let saves = self.shared.persistence.stats();
        CoordinatorMetrics {
            ticks: c.ticks.load(Ordering::Relaxed),
            invocations: c.invocations.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            skipped_in_flight: c.skipped_in_flight.load(Ordering::Relaxed),
            registered_subscribers: self.subscriber_count(),
            reloads: c.reloads.load(Ordering::Relaxed),
            reload_failures: c.reload_failures.load(Ordering::Relaxed),
            settings_notifications: c.settings_notifications.load(Ordering::Relaxed),
            http_clients_built: c.http_clients_built.load(Ordering::Relaxed),
            saves_queued: saves.queued,
            saves_written: saves.written,
            saves_coalesced: saves.coalesced,
            saves_failed: saves.failed,
        }
    }

    /// Stop the tick loop, drop every registration and flush pending saves
    ///
    /// In-flight invocations are left to finish on their own.
    pub async fn shutdown(&self) {
        debug!("Coordinator::shutdown: called");
        self.shared.shutdown_tx.send_replace(true);
        lock(&self.shared.registry).clear();
        self.shared.persistence.flush().await;
        info!("Coordinator shut down");
    }
}
