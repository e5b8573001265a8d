//! Shared Resource Coordinator
//!
//! One coordinator per process owns every resource the widgets share:
//! - **HTTP client:** built lazily, reused by every widget
//! - **Settings cache:** TTL-refreshed snapshot with change notifications
//! - **Subscriber registry:** independently-scheduled callbacks multiplexed over one master tick
//! - **Persistence queue:** coalesced, per-document serialized writes

mod config;
mod core;
mod error;
mod messages;
mod persistence;
mod registry;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use error::CoordinatorError;
pub use messages::{ChangeSource, CoordinatorEvent, CoordinatorMetrics, TickReport};
pub use persistence::{PersistenceSink, SaveReceipt, StoreSink};
pub use registry::SubscriberId;
