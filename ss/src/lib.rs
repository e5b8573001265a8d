//! SettingsStore - durable documents for the sidebar host
//!
//! Three independently-keyed YAML documents live side by side in one
//! directory:
//!
//! - `settings.yml` - panel geometry and per-widget thresholds ([`SettingsData`])
//! - `shortcuts.yml` - user-defined launcher entries ([`ShortcutsData`])
//! - `notes.yml` - notepad tabs ([`NotesData`])
//!
//! Every document is validated on load. Missing or unparsable documents are
//! replaced by documented defaults, which are written back immediately, so a
//! caller never sees a corrupt document. Writes are atomic (temp file +
//! rename) and serialized by an advisory file lock.

pub mod error;
pub mod notes;
pub mod settings;
pub mod shortcuts;
pub mod store;

pub use error::StoreError;
pub use notes::{NoteTab, NotesData};
pub use settings::{
    SCHEMA_VERSION, SettingsData, SidebarPosition, StockSettings, SystemMonitorSettings, WeatherSettings,
    WindowSettings,
};
pub use shortcuts::{ShortcutItem, ShortcutType, ShortcutsData};
pub use store::{APP_DIR_NAME, NOTES_DOC, SETTINGS_DOC, SHORTCUTS_DOC, SettingsStore};
