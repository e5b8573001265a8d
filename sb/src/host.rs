//! Host wiring: one coordinator, one widget manager, one panel

use std::sync::Mutex;

use colored::Colorize;
use eyre::{Context, Result};
use settingsstore::SettingsStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorEvent};
use crate::lifecycle::{PriorityTable, WidgetCatalog, WidgetHandle, WidgetManager};
use crate::widget::{InitPhase, Surface, WidgetMetadata};
use crate::widgets::builtin_catalog;

/// Render every surface as a block of text, in the order given
pub fn render_panel(surfaces: &[(String, Surface)]) -> String {
    let mut out = String::new();
    for (name, surface) in surfaces {
        if surface.is_inert() {
            out.push_str(&format!("{}\n", format!("{} (unavailable)", name).dimmed()));
        } else {
            out.push_str(&format!("{}\n", name.bold()));
        }
        for line in surface.lines() {
            out.push_str(&format!("  {}\n", line));
        }
    }
    out
}

/// One row of the widget listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub name: String,
    pub phase: InitPhase,
    pub rank: u32,
    pub metadata: WidgetMetadata,
}

pub struct Host {
    coordinator: Coordinator,
    catalog: WidgetCatalog,
    priorities: PriorityTable,
    manager: WidgetManager,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl Host {
    pub fn new(config: &Config) -> Self {
        debug!(?config, "Host::new: called");
        let store = match &config.data_dir {
            Some(dir) => SettingsStore::new(dir),
            None => SettingsStore::default_location(),
        };
        let coordinator = Coordinator::new(config.coordinator.clone(), store);
        let catalog = builtin_catalog().without(&config.widgets.disabled);
        let priorities = PriorityTable::default().with_overrides(&config.widgets.priorities);
        let manager = WidgetManager::new(coordinator.clone(), catalog.clone(), priorities.clone());
        Self {
            coordinator,
            catalog,
            priorities,
            manager,
            tick_task: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn manager(&self) -> &WidgetManager {
        &self.manager
    }

    /// Catalog entries in layout order, without constructing any widget
    pub fn layout(&self) -> Vec<LayoutEntry> {
        let mut entries: Vec<LayoutEntry> = self
            .catalog
            .factories()
            .iter()
            .map(|f| LayoutEntry {
                name: f.name.clone(),
                phase: f.phase,
                rank: self.priorities.rank(&f.name),
                metadata: f.metadata.clone(),
            })
            .collect();
        self.priorities.sort(&mut entries, |e| e.name.as_str());
        entries
    }

    /// Load settings, bring every widget up, and start the master tick
    pub async fn start(&self) -> Result<Vec<WidgetHandle>> {
        debug!("Host::start: called");
        let coordinator = self.coordinator.clone();
        tokio::task::spawn_blocking(move || coordinator.settings())
            .await
            .context("Failed to load settings")?;

        self.manager.discover_and_load();
        let handles = self.manager.initialize_all().await;

        let task = self
            .coordinator
            .spawn_master_tick()
            .context("Failed to start master tick")?;
        *self.tick_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);

        info!(widgets = handles.len(), "Host started");
        Ok(handles)
    }

    pub fn panel(&self) -> String {
        render_panel(&self.manager.surfaces())
    }

    /// Print the panel after every master tick
    ///
    /// Stops after `ticks` ticks, or on Ctrl-C when `ticks` is `None`.
    pub async fn run(&self, ticks: Option<u64>) -> Result<()> {
        debug!(?ticks, "Host::run: called");
        let mut events = self.coordinator.subscribe_events();
        self.start().await?;
        println!("{}", self.panel());

        let mut seen = 0u64;
        loop {
            if ticks.is_some_and(|limit| seen >= limit) {
                break;
            }
            tokio::select! {
                event = events.recv() => match event {
                    Ok(CoordinatorEvent::MasterTick(report)) => {
                        seen += 1;
                        if report.failures() > 0 {
                            debug!(?report, "Host::run: tick had failures");
                        }
                        println!("{}", self.panel());
                    }
                    Ok(CoordinatorEvent::SettingsChanged { source, .. }) => {
                        info!(?source, "Settings changed");
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Host event receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        self.stop().await;
        Ok(())
    }

    /// Dispose widgets, stop the coordinator, and wait for the tick loop to exit
    pub async fn stop(&self) {
        debug!("Host::stop: called");
        self.manager.dispose_all();
        self.coordinator.shutdown().await;
        let task = self.tick_task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Master tick task ended abnormally");
        }
        info!("Host stopped");
    }
}
