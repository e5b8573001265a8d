//! Notes document types

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Maximum number of tabs the notepad allows
pub const MAX_TABS: usize = 8;

/// Content of a fresh default tab
pub const DEFAULT_NOTE: &str = "Hi. This is your notepad. Markdown accepted.";

/// One notepad tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NoteTab {
    pub id: String,
    pub title: String,
    pub content: String,
    pub is_default: bool,
}

impl Default for NoteTab {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            title: String::new(),
            content: String::new(),
            is_default: false,
        }
    }
}

/// Notes document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NotesData {
    pub tabs: Vec<NoteTab>,
    pub last_active_tab: usize,
}

impl NotesData {
    /// Guarantee exactly one default tab, placed first
    pub fn ensure_default_tab(&mut self, content: &str) {
        debug!(tabs = self.tabs.len(), "NotesData::ensure_default_tab: called");
        for tab in &mut self.tabs {
            if tab.id.trim().is_empty() {
                tab.id = Uuid::now_v7().to_string();
            }
        }

        match self.tabs.iter().position(|t| t.is_default) {
            Some(pos) => {
                let tab = self.tabs.remove(pos);
                self.tabs.insert(0, tab);
                for other in self.tabs.iter_mut().skip(1) {
                    other.is_default = false;
                }
            }
            None => {
                debug!("NotesData::ensure_default_tab: creating default tab");
                self.tabs.insert(
                    0,
                    NoteTab {
                        content: content.to_string(),
                        is_default: true,
                        ..NoteTab::default()
                    },
                );
                self.last_active_tab = 0;
            }
        }

        if self.last_active_tab >= self.tabs.len() {
            self.last_active_tab = 0;
        }
    }

    /// Currently active tab, repairing the document if needed
    pub fn active_tab(&mut self) -> &NoteTab {
        if self.tabs.is_empty() {
            self.ensure_default_tab(DEFAULT_NOTE);
        }
        if self.last_active_tab >= self.tabs.len() {
            self.last_active_tab = self.tabs.iter().position(|t| t.is_default).unwrap_or(0);
        }
        &self.tabs[self.last_active_tab]
    }

    /// Add an empty tab unless the limit is reached
    pub fn add_tab(&mut self, max_tabs: usize) -> Option<&NoteTab> {
        debug!(tabs = self.tabs.len(), max_tabs, "NotesData::add_tab: called");
        if self.tabs.len() >= max_tabs {
            debug!("NotesData::add_tab: tab limit reached");
            return None;
        }
        self.tabs.push(NoteTab::default());
        self.last_active_tab = self.tabs.len() - 1;
        self.tabs.last()
    }

    /// Remove a tab; the default tab stays
    pub fn remove_tab(&mut self, id: &str) -> bool {
        debug!(%id, "NotesData::remove_tab: called");
        let Some(pos) = self.tabs.iter().position(|t| t.id == id) else {
            return false;
        };
        if self.tabs[pos].is_default {
            debug!(%id, "NotesData::remove_tab: refusing to remove default tab");
            return false;
        }
        self.tabs.remove(pos);
        if self.last_active_tab >= pos && self.last_active_tab > 0 {
            self.last_active_tab -= 1;
        }
        true
    }

    /// Replace the content of one tab
    pub fn update_content(&mut self, id: &str, content: &str) -> bool {
        match self.tabs.iter_mut().find(|t| t.id == id) {
            Some(tab) => {
                tab.content = content.to_string();
                true
            }
            None => false,
        }
    }
}
