//! Capability contracts for pluggable widgets
//!
//! A widget is one panel section. The lifecycle manager only sees it through
//! [`Widget`]; the coordinator only sees the periodic half of it through
//! [`PeriodicSubscriber`].

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use settingsstore::StoreError;
use thiserror::Error;
use tracing::debug;

/// Whether a widget needs the network to produce its first render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitPhase {
    /// Initialized sequentially before any remote widget
    Local,
    /// Initialized concurrently after all local widgets
    Remote,
}

impl std::fmt::Display for InitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Descriptive information about a widget implementation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WidgetMetadata {
    pub description: String,
    pub author: String,
    pub version: String,
    /// Shared resources or other widgets this one relies on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl WidgetMetadata {
    /// Metadata for a widget shipped with this crate
    pub fn builtin(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            author: "gtt-sidebar".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// Errors raised by widget initializers, tick callbacks and disposers
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    BadResponse(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Default)]
struct SurfaceState {
    lines: Vec<String>,
    inert: bool,
    updated_at: Option<DateTime<Local>>,
}

/// Opaque render handle shared between a widget and the host
///
/// Cloning is cheap and every clone observes the same content.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    state: Arc<RwLock<SurfaceState>>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rendered lines
    pub fn set_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.lines = lines.into_iter().map(Into::into).collect();
        state.updated_at = Some(Local::now());
    }

    pub fn lines(&self) -> Vec<String> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).lines.clone()
    }

    /// Mark the surface as present but not updating
    pub fn set_inert(&self, inert: bool) {
        debug!(inert, "Surface::set_inert: called");
        self.state.write().unwrap_or_else(|e| e.into_inner()).inert = inert;
    }

    pub fn is_inert(&self) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).inert
    }

    pub fn updated_at(&self) -> Option<DateTime<Local>> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).updated_at
    }
}

/// A pluggable panel section
#[async_trait]
pub trait Widget: Send + Sync {
    /// Stable display and lookup name
    fn name(&self) -> &str;

    /// Declared initialization dependency
    fn phase(&self) -> InitPhase;

    /// Description, author, version and dependencies
    fn metadata(&self) -> WidgetMetadata {
        WidgetMetadata::default()
    }

    /// Visual representation; placed by the host, never interpreted
    fn surface(&self) -> Surface;

    /// First-load work; may be slow
    async fn initialize(&self) -> Result<(), WidgetError>;

    /// Release resources. Must be idempotent.
    fn dispose(&self) -> Result<(), WidgetError>;

    /// Periodic half of the widget, if it needs recurring updates
    ///
    /// Must return the same `Arc` on every call while the subscription is
    /// current, since the coordinator keys registrations by pointer.
    fn subscriber(&self) -> Option<Arc<dyn PeriodicSubscriber>> {
        None
    }

    /// Out-of-schedule refresh pushed by name
    async fn refresh(&self) -> Result<(), WidgetError> {
        Ok(())
    }
}

/// A component driven by the coordinator's master tick
#[async_trait]
pub trait PeriodicSubscriber: Send + Sync {
    /// Label for logs; not an identity
    fn name(&self) -> &str;

    /// Desired time between invocations
    fn interval(&self) -> Duration;

    /// Invoked when due. Errors are caught by the caller.
    async fn on_tick(&self) -> Result<(), WidgetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_clones_share_state() {
        let surface = Surface::new();
        let placed = surface.clone();

        surface.set_lines(["12:00:00", "Mon 01 Jan"]);
        assert_eq!(placed.lines(), vec!["12:00:00".to_string(), "Mon 01 Jan".to_string()]);
        assert!(placed.updated_at().is_some());

        placed.set_inert(true);
        assert!(surface.is_inert());
    }

    #[test]
    fn test_init_phase_serde() {
        assert_eq!(serde_yaml::to_string(&InitPhase::Remote).unwrap().trim(), "remote");
        let phase: InitPhase = serde_yaml::from_str("local").unwrap();
        assert_eq!(phase, InitPhase::Local);
        assert_eq!(InitPhase::Local.to_string(), "local");
    }

    #[test]
    fn test_builtin_metadata() {
        let meta = WidgetMetadata::builtin("Local time").depends_on(["settings"]);
        assert_eq!(meta.author, "gtt-sidebar");
        assert_eq!(meta.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(meta.dependencies, vec!["settings".to_string()]);

        let yaml = serde_yaml::to_string(&WidgetMetadata::builtin("x")).unwrap();
        assert!(!yaml.contains("dependencies"));
    }

    #[test]
    fn test_widget_error_messages() {
        let err = WidgetError::NotConfigured("missing API key".to_string());
        assert_eq!(err.to_string(), "Not configured: missing API key");

        let err = WidgetError::BadResponse("no price".to_string());
        assert!(err.to_string().contains("no price"));
    }
}
