//! Plugin Discovery & Lifecycle Manager
//!
//! Widgets come from an explicit [`WidgetCatalog`] of factories. The manager
//! constructs them, sorts them by [`PriorityTable`], and initializes them in
//! two phases: local widgets one at a time, then remote widgets all at once.

mod handle;
mod manager;
mod registry;

pub use handle::{WidgetHandle, WidgetState};
pub use manager::WidgetManager;
pub use registry::{PriorityTable, UNRANKED, WidgetCatalog, WidgetContext, WidgetFactory};
