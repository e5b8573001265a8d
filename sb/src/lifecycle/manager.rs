//! Plugin discovery and two-phase initialization

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::handle::{WidgetHandle, WidgetState};
use super::registry::{PriorityTable, WidgetCatalog, WidgetContext};
use crate::coordinator::Coordinator;
use crate::widget::{InitPhase, Surface, Widget};

/// Discovers widgets, orders them, and drives their lifecycle
pub struct WidgetManager {
    context: WidgetContext,
    catalog: WidgetCatalog,
    priorities: PriorityTable,
    handles: Mutex<Vec<WidgetHandle>>,
}

impl WidgetManager {
    pub fn new(coordinator: Coordinator, catalog: WidgetCatalog, priorities: PriorityTable) -> Self {
        debug!(widgets = catalog.len(), "WidgetManager::new: called");
        Self {
            context: WidgetContext::new(coordinator),
            catalog,
            priorities,
            handles: Mutex::new(Vec::new()),
        }
    }

    fn coordinator(&self) -> &Coordinator {
        &self.context.coordinator
    }

    fn handles(&self) -> MutexGuard<'_, Vec<WidgetHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Construct every catalog entry and sort the result into layout order
    ///
    /// A factory that errors or panics is logged and skipped.
    pub fn discover_and_load(&self) -> Vec<WidgetHandle> {
        debug!("WidgetManager::discover_and_load: called");
        if !self.handles().is_empty() {
            warn!("Widgets already discovered, returning existing handles");
            return self.loaded();
        }

        let mut discovered = Vec::with_capacity(self.catalog.len());
        for (id, factory) in self.catalog.factories().iter().enumerate() {
            let constructed = std::panic::catch_unwind(AssertUnwindSafe(|| factory.construct(&self.context)));
            match constructed {
                Ok(Ok(widget)) => {
                    if widget.phase() != factory.phase {
                        warn!(
                            name = %factory.name,
                            declared = %factory.phase,
                            actual = %widget.phase(),
                            "Widget phase differs from its factory"
                        );
                    }
                    let rank = self.priorities.rank(widget.name());
                    debug!(name = widget.name(), rank, "WidgetManager::discover_and_load: constructed");
                    discovered.push(WidgetHandle::new(id, rank, widget));
                }
                Ok(Err(e)) => {
                    warn!(name = %factory.name, error = %e, "Failed to construct widget, skipping");
                }
                Err(_) => {
                    warn!(name = %factory.name, "Widget constructor panicked, skipping");
                }
            }
        }

        self.priorities.sort(&mut discovered, |h| h.name.as_str());
        info!(
            order = ?discovered.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(),
            "Discovered widgets"
        );

        *self.handles() = discovered.clone();
        discovered
    }

    /// Apply a state change if the state machine allows it
    fn transition(&self, id: usize, next: WidgetState, error: Option<String>) -> bool {
        let mut handles = self.handles();
        let Some(handle) = handles.iter_mut().find(|h| h.id == id) else {
            debug!(id, "WidgetManager::transition: handle gone");
            return false;
        };
        if !handle.state.can_transition_to(next) {
            warn!(name = %handle.name, from = %handle.state, to = %next, "Refusing illegal widget transition");
            return false;
        }
        handle.state = next;
        if error.is_some() {
            handle.last_error = error;
        }
        true
    }

    async fn initialize_one(&self, id: usize, widget: Arc<dyn Widget>) {
        let name = widget.name().to_string();
        if !self.transition(id, WidgetState::Initializing, None) {
            return;
        }
        debug!(%name, "WidgetManager::initialize_one: initializing");

        let outcome = AssertUnwindSafe(widget.initialize()).catch_unwind().await;
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("initializer panicked".to_string()),
        };

        match error {
            None => {
                info!(%name, "Widget ready");
                self.transition(id, WidgetState::Ready, None);
            }
            Some(message) => {
                warn!(%name, error = %message, "Widget failed to initialize");
                widget.surface().set_inert(true);
                self.transition(id, WidgetState::Failed, Some(message));
            }
        }
    }

    /// Initialize local widgets in order, then remote widgets concurrently
    ///
    /// Every local initializer has finished before the first remote one
    /// starts. Afterwards every laid-out widget with a periodic half is
    /// registered with the coordinator.
    pub async fn initialize_all(&self) -> Vec<WidgetHandle> {
        debug!("WidgetManager::initialize_all: called");
        let pending: Vec<(usize, InitPhase, Arc<dyn Widget>)> = self
            .handles()
            .iter()
            .filter(|h| h.state == WidgetState::Discovered)
            .map(|h| (h.id, h.phase, h.widget.clone()))
            .collect();

        let (local, remote): (Vec<_>, Vec<_>) = pending.into_iter().partition(|(_, phase, _)| *phase == InitPhase::Local);
        info!(local = local.len(), remote = remote.len(), "Initializing widgets");

        for (id, _, widget) in local {
            self.initialize_one(id, widget).await;
        }

        join_all(remote.into_iter().map(|(id, _, widget)| self.initialize_one(id, widget))).await;

        self.subscribe_periodic();
        self.loaded()
    }

    fn subscribe_periodic(&self) {
        let laid_out: Vec<WidgetHandle> = self
            .handles()
            .iter()
            .filter(|h| h.state.is_laid_out())
            .cloned()
            .collect();

        for handle in laid_out {
            let Some(subscriber) = handle.widget.subscriber() else {
                continue;
            };
            let interval = subscriber.interval();
            if let Err(e) = self.coordinator().subscribe(subscriber, interval) {
                warn!(name = %handle.name, error = %e, "Failed to subscribe widget");
            }
        }
    }

    /// Unsubscribe and dispose every widget, then clear the registry
    ///
    /// Safe to call at any point, including before initialization.
    pub fn dispose_all(&self) {
        debug!("WidgetManager::dispose_all: called");
        let handles: Vec<WidgetHandle> = self.handles().clone();

        for handle in &handles {
            if let Some(subscriber) = handle.widget.subscriber() {
                self.coordinator().unsubscribe(&subscriber);
            }
            let widget = handle.widget.clone();
            match std::panic::catch_unwind(AssertUnwindSafe(|| widget.dispose())) {
                Ok(Ok(())) => debug!(name = %handle.name, "WidgetManager::dispose_all: disposed"),
                Ok(Err(e)) => warn!(name = %handle.name, error = %e, "Widget dispose failed"),
                Err(_) => warn!(name = %handle.name, "Widget dispose panicked"),
            }
            self.transition(handle.id, WidgetState::Disposed, None);
        }

        self.handles().clear();
        info!(count = handles.len(), "Disposed widgets");
    }

    /// Copy of the current handles in layout order
    pub fn loaded(&self) -> Vec<WidgetHandle> {
        self.handles().clone()
    }

    pub fn find(&self, name: &str) -> Option<WidgetHandle> {
        self.handles().iter().find(|h| h.name == name).cloned()
    }

    /// Push an out-of-schedule refresh to one widget
    ///
    /// Returns `false` if no such widget is loaded or the refresh failed.
    pub async fn refresh(&self, name: &str) -> bool {
        debug!(%name, "WidgetManager::refresh: called");
        let Some(handle) = self.find(name) else {
            debug!(%name, "WidgetManager::refresh: not loaded");
            return false;
        };
        match AssertUnwindSafe(handle.widget.refresh()).catch_unwind().await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(%name, error = %e, "Widget refresh failed");
                false
            }
            Err(_) => {
                warn!(%name, "Widget refresh panicked");
                false
            }
        }
    }

    /// Rendered surfaces of laid-out widgets in layout order
    pub fn surfaces(&self) -> Vec<(String, Surface)> {
        self.handles()
            .iter()
            .filter(|h| h.state.is_laid_out())
            .map(|h| (h.name.clone(), h.widget.surface()))
            .collect()
    }
}
