//! Shortcut document types

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::settings::SCHEMA_VERSION;

/// Command names accepted without a path on disk
const KNOWN_COMMANDS: &[&str] = &[
    "calc",
    "calculator",
    "taskmgr",
    "taskmanager",
    "explorer",
    "mspaint",
    "paint",
    "cmd",
    "command",
    "control",
    "controlpanel",
    "notepad",
    "msconfig",
    "regedit",
    "winver",
];

const URL_SCHEMES: &[&str] = &["http://", "https://", "ftp://"];

/// Kind of target a shortcut launches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShortcutType {
    /// Executable or script on disk
    #[default]
    Executable,
    /// Web page
    Url,
    /// Bare command resolved by the shell
    Command,
    /// `.lnk` link file
    Link,
}

impl ShortcutType {
    /// Guess the kind of target from its path
    pub fn detect(path: &str) -> Self {
        debug!(%path, "ShortcutType::detect: called");
        let path = path.trim();
        if path.is_empty() {
            return Self::Executable;
        }
        if URL_SCHEMES.iter().any(|scheme| path.starts_with(scheme)) {
            return Self::Url;
        }
        if path.to_lowercase().ends_with(".lnk") {
            return Self::Link;
        }
        if path.contains('\\') || path.contains('/') || Path::new(path).exists() {
            return Self::Executable;
        }
        Self::Command
    }
}

impl std::fmt::Display for ShortcutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Executable => write!(f, "executable"),
            Self::Url => write!(f, "url"),
            Self::Command => write!(f, "command"),
            Self::Link => write!(f, "link"),
        }
    }
}

/// A single launcher entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ShortcutItem {
    pub id: String,

    /// Tooltip text
    pub label: String,

    /// File path, URL, or command line
    pub path: String,

    /// "builtin" or "custom"
    #[serde(default = "default_icon_type")]
    pub icon_type: String,

    /// Emoji for builtin icons, file name for custom ones
    #[serde(default)]
    pub icon_value: String,

    #[serde(rename = "type", default)]
    pub kind: ShortcutType,

    #[serde(default)]
    pub order: usize,
}

fn default_icon_type() -> String {
    "builtin".to_string()
}

/// Pull the executable out of a command line that may carry arguments
fn extract_executable_path(command_line: &str) -> &str {
    let trimmed = command_line.trim();

    if let Some(rest) = trimmed.strip_prefix('"')
        && let Some(end) = rest.find('"')
    {
        return &rest[..end];
    }

    if let Some(space) = trimmed.find(' ') {
        let candidate = &trimmed[..space];
        if (candidate.contains('\\') || candidate.contains('/')) && Path::new(candidate).exists() {
            return candidate;
        }
    }

    trimmed
}

fn is_known_command(command: &str) -> bool {
    let lower = command.to_lowercase();
    KNOWN_COMMANDS.contains(&lower.as_str())
}

impl ShortcutItem {
    /// Check that the entry can actually be launched
    pub fn is_valid(&self) -> bool {
        if self.id.trim().is_empty() || self.label.trim().is_empty() || self.path.trim().is_empty() {
            debug!(id = %self.id, "ShortcutItem::is_valid: blank required field");
            return false;
        }

        match self.kind {
            ShortcutType::Executable | ShortcutType::Link => {
                let executable = extract_executable_path(&self.path);
                let valid = Path::new(executable).exists() || is_known_command(executable);
                if !valid {
                    debug!(id = %self.id, %executable, "ShortcutItem::is_valid: target missing");
                }
                valid
            }
            ShortcutType::Url => URL_SCHEMES.iter().any(|scheme| self.path.starts_with(scheme)),
            ShortcutType::Command => true,
        }
    }
}

/// Shortcut document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ShortcutsData {
    pub version: String,
    pub shortcuts: Vec<ShortcutItem>,
}

impl Default for ShortcutsData {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            shortcuts: Vec::new(),
        }
    }
}

impl ShortcutsData {
    /// Drop invalid and duplicate entries and renumber the rest
    pub fn validate_and_cleanup(&mut self) {
        debug!(count = self.shortcuts.len(), "ShortcutsData::validate_and_cleanup: called");
        let mut kept: Vec<ShortcutItem> = Vec::with_capacity(self.shortcuts.len());
        for item in self.shortcuts.drain(..) {
            if !item.is_valid() {
                debug!(id = %item.id, "ShortcutsData::validate_and_cleanup: dropping invalid entry");
                continue;
            }
            if kept.iter().any(|k| k.id == item.id) {
                debug!(id = %item.id, "ShortcutsData::validate_and_cleanup: dropping duplicate id");
                continue;
            }
            kept.push(item);
        }
        for (order, item) in kept.iter_mut().enumerate() {
            item.order = order;
        }
        self.shortcuts = kept;
    }

    fn renumber(&mut self) {
        for (order, item) in self.shortcuts.iter_mut().enumerate() {
            item.order = order;
        }
    }

    /// Append a new entry with a fresh id
    pub fn add_shortcut(&mut self, label: &str, path: &str, icon_type: &str, icon_value: &str) -> ShortcutItem {
        debug!(%label, %path, "ShortcutsData::add_shortcut: called");
        let item = ShortcutItem {
            id: Uuid::now_v7().to_string(),
            label: label.to_string(),
            path: path.to_string(),
            icon_type: icon_type.to_string(),
            icon_value: icon_value.to_string(),
            kind: ShortcutType::detect(path),
            order: self.shortcuts.len(),
        };
        self.shortcuts.push(item.clone());
        item
    }

    /// Remove an entry by id, returning whether it existed
    pub fn remove_shortcut(&mut self, id: &str) -> bool {
        debug!(%id, "ShortcutsData::remove_shortcut: called");
        let before = self.shortcuts.len();
        self.shortcuts.retain(|s| s.id != id);
        if self.shortcuts.len() == before {
            debug!(%id, "ShortcutsData::remove_shortcut: not found");
            return false;
        }
        self.renumber();
        true
    }

    /// Apply a new order given as a full list of ids
    ///
    /// Requests that do not name exactly as many ids as there are entries
    /// are ignored.
    pub fn reorder(&mut self, ids: &[String]) {
        debug!(count = ids.len(), "ShortcutsData::reorder: called");
        if ids.len() != self.shortcuts.len() {
            debug!("ShortcutsData::reorder: length mismatch, ignoring");
            return;
        }
        let mut reordered = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(pos) = self.shortcuts.iter().position(|s| &s.id == id) {
                reordered.push(self.shortcuts.remove(pos));
            }
        }
        self.shortcuts = reordered;
        self.renumber();
    }

    /// Starter set for first-time users
    pub fn create_default() -> Self {
        debug!("ShortcutsData::create_default: called");
        let mut data = Self::default();
        data.add_shortcut("Calculator", "calc", "builtin", "🧮");
        data.add_shortcut("File Explorer", "explorer", "builtin", "📁");
        data.add_shortcut("Paint", "mspaint", "builtin", "🎨");
        data.add_shortcut("Command Prompt", "cmd", "builtin", "🔳");
        data
    }
}
