//! gtt-sidebar - widget host for a persistent desktop sidebar
//!
//! The host keeps a column of small, independent widgets alive for hours or
//! days. Widgets share one HTTP client, one settings snapshot and one timer
//! instead of each owning their own.
//!
//! # Modules
//!
//! - [`widget`] - Capability contracts every widget implements
//! - [`coordinator`] - Shared resources, master tick and coalesced persistence
//! - [`lifecycle`] - Widget discovery, ordering and two-phase initialization
//! - [`widgets`] - Built-in widgets
//! - [`host`] - Wiring for the binary
//! - [`config`] - Host configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod host;
pub mod lifecycle;
pub mod widget;
pub mod widgets;

pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorEvent};
pub use host::Host;
pub use lifecycle::{PriorityTable, WidgetCatalog, WidgetHandle, WidgetManager, WidgetState};
pub use widget::{InitPhase, PeriodicSubscriber, Surface, Widget, WidgetError, WidgetMetadata};
