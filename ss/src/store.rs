//! Durable document storage
//!
//! Each document is a YAML file named `<name>.yml` inside the store
//! directory. Writes go through [`SettingsStore::write_document`], which
//! replaces the file atomically while holding an exclusive advisory lock on
//! `<name>.lock`.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::notes::{DEFAULT_NOTE, NotesData};
use crate::settings::SettingsData;
use crate::shortcuts::ShortcutsData;

/// Directory name under the platform config dir
pub const APP_DIR_NAME: &str = "gtt-sidebar";

pub const SETTINGS_DOC: &str = "settings";
pub const SHORTCUTS_DOC: &str = "shortcuts";
pub const NOTES_DOC: &str = "notes";

const EXTENSION: &str = "yml";

/// Outcome of reading a document from disk
enum Loaded<T> {
    Missing,
    Corrupt,
    Parsed(T),
}

/// File-backed store for the sidebar documents
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(?dir, "SettingsStore::new: called");
        Self { dir }
    }

    /// Store in the platform config directory
    pub fn default_location() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(APP_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing a named document
    pub fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", name))
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(StoreError::io(&self.dir))
    }

    /// Atomically replace a document's contents
    pub fn write_document(&self, name: &str, contents: &str) -> Result<(), StoreError> {
        debug!(%name, bytes = contents.len(), "SettingsStore::write_document: called");
        self.ensure_dir()?;

        let lock_path = self.lock_path(name);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(StoreError::io(&lock_path))?;
        FileExt::lock_exclusive(&lock).map_err(|source| StoreError::Lock {
            path: lock_path.clone(),
            source,
        })?;

        let target = self.document_path(name);
        let temp = self.dir.join(format!(".{}.{}.tmp", name, EXTENSION));
        let result = Self::replace_file(&temp, &target, contents);

        if let Err(source) = FileExt::unlock(&lock) {
            warn!(?lock_path, %source, "SettingsStore::write_document: failed to release lock");
        }
        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }

    fn replace_file(temp: &Path, target: &Path, contents: &str) -> Result<(), StoreError> {
        let mut file = File::create(temp).map_err(StoreError::io(temp))?;
        file.write_all(contents.as_bytes()).map_err(StoreError::io(temp))?;
        file.sync_all().map_err(StoreError::io(temp))?;
        drop(file);
        fs::rename(temp, target).map_err(StoreError::io(target))
    }

    /// Copy a document to a timestamped backup next to it
    pub fn backup_document(&self, name: &str) -> Result<Option<PathBuf>, StoreError> {
        debug!(%name, "SettingsStore::backup_document: called");
        let source = self.document_path(name);
        if !source.exists() {
            debug!(%name, "SettingsStore::backup_document: nothing to back up");
            return Ok(None);
        }
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let backup = self.dir.join(format!("{}_backup_{}.{}", name, stamp, EXTENSION));
        fs::copy(&source, &backup).map_err(StoreError::io(&backup))?;
        info!(?backup, "Backed up {} document", name);
        Ok(Some(backup))
    }

    fn read_document<T: DeserializeOwned>(&self, name: &str) -> Result<Loaded<T>, StoreError> {
        let path = self.document_path(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Loaded::Missing),
            Err(err) => return Err(StoreError::Io { path, source: err }),
        };
        if contents.trim().is_empty() {
            debug!(%name, "SettingsStore::read_document: empty document");
            return Ok(Loaded::Missing);
        }
        match serde_yaml::from_str(&contents) {
            Ok(value) => Ok(Loaded::Parsed(value)),
            Err(source) => {
                let err = StoreError::Parse { path, source };
                warn!(%err, "Document is corrupt, falling back to defaults");
                Ok(Loaded::Corrupt)
            }
        }
    }

    fn persist<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(value)?;
        self.write_document(name, &yaml)
    }

    /// Read a document, replacing missing or corrupt ones with `defaults`
    ///
    /// Returns the value and whether it came from disk.
    fn load_or_recover<T, F>(&self, name: &str, defaults: F) -> Result<(T, bool), StoreError>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce() -> T,
    {
        match self.read_document(name)? {
            Loaded::Parsed(value) => Ok((value, true)),
            Loaded::Missing => {
                info!(%name, "Document missing, writing defaults");
                let value = defaults();
                self.persist(name, &value)?;
                Ok((value, false))
            }
            Loaded::Corrupt => {
                self.backup_document(name)?;
                let value = defaults();
                self.persist(name, &value)?;
                Ok((value, false))
            }
        }
    }

    /// Load settings, clamped into range
    pub fn load_settings(&self) -> Result<SettingsData, StoreError> {
        debug!(dir = ?self.dir, "SettingsStore::load_settings: called");
        let (mut settings, from_disk) = self.load_or_recover(SETTINGS_DOC, SettingsData::default)?;
        if from_disk && !settings.is_valid() {
            info!("Settings out of range, correcting");
            settings.validate_and_correct();
            self.persist(SETTINGS_DOC, &settings)?;
        }
        Ok(settings)
    }

    /// Persist a clamped copy of `settings`
    pub fn save_settings(&self, settings: &SettingsData) -> Result<(), StoreError> {
        debug!("SettingsStore::save_settings: called");
        let corrected = settings.clone().corrected();
        self.persist(SETTINGS_DOC, &corrected)
    }

    pub async fn load_settings_async(&self) -> Result<SettingsData, StoreError> {
        debug!("SettingsStore::load_settings_async: called");
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_settings())
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    pub async fn save_settings_async(&self, settings: SettingsData) -> Result<(), StoreError> {
        debug!("SettingsStore::save_settings_async: called");
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save_settings(&settings))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Back up the settings document and write defaults
    pub fn reset_settings(&self) -> Result<SettingsData, StoreError> {
        debug!("SettingsStore::reset_settings: called");
        self.backup_document(SETTINGS_DOC)?;
        let settings = SettingsData::default();
        self.persist(SETTINGS_DOC, &settings)?;
        info!("Settings reset to defaults");
        Ok(settings)
    }

    /// Load shortcuts, dropping entries that can no longer be launched
    pub fn load_shortcuts(&self) -> Result<ShortcutsData, StoreError> {
        debug!("SettingsStore::load_shortcuts: called");
        let (mut data, from_disk) = self.load_or_recover(SHORTCUTS_DOC, ShortcutsData::create_default)?;
        if from_disk {
            let before = data.clone();
            data.validate_and_cleanup();
            if data != before {
                info!(
                    kept = data.shortcuts.len(),
                    dropped = before.shortcuts.len() - data.shortcuts.len(),
                    "Cleaned up shortcuts"
                );
                self.persist(SHORTCUTS_DOC, &data)?;
            }
        }
        Ok(data)
    }

    pub fn save_shortcuts(&self, data: &ShortcutsData) -> Result<(), StoreError> {
        debug!(count = data.shortcuts.len(), "SettingsStore::save_shortcuts: called");
        self.persist(SHORTCUTS_DOC, data)
    }

    /// Back up the shortcuts document and write the starter set
    pub fn reset_shortcuts(&self) -> Result<ShortcutsData, StoreError> {
        debug!("SettingsStore::reset_shortcuts: called");
        self.backup_document(SHORTCUTS_DOC)?;
        let data = ShortcutsData::create_default();
        self.persist(SHORTCUTS_DOC, &data)?;
        info!("Shortcuts reset to defaults");
        Ok(data)
    }

    /// Load notes, guaranteeing a default tab
    pub fn load_notes(&self) -> Result<NotesData, StoreError> {
        debug!("SettingsStore::load_notes: called");
        let (mut notes, from_disk) = self.load_or_recover(NOTES_DOC, || {
            let mut notes = NotesData::default();
            notes.ensure_default_tab(DEFAULT_NOTE);
            notes
        })?;
        if from_disk {
            let before = notes.clone();
            notes.ensure_default_tab(DEFAULT_NOTE);
            if notes != before {
                self.persist(NOTES_DOC, &notes)?;
            }
        }
        Ok(notes)
    }

    pub fn save_notes(&self, notes: &NotesData) -> Result<(), StoreError> {
        debug!(tabs = notes.tabs.len(), "SettingsStore::save_notes: called");
        self.persist(NOTES_DOC, notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SidebarPosition;
    use tempfile::tempdir;

    fn backups(dir: &Path, name: &str) -> Vec<PathBuf> {
        let prefix = format!("{}_backup_", name);
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect()
    }

    #[test]
    fn test_missing_settings_writes_defaults() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path().join("cfg"));

        let settings = store.load_settings().unwrap();
        assert_eq!(settings, SettingsData::default());
        assert!(store.document_path(SETTINGS_DOC).exists());
    }

    #[test]
    fn test_corrupt_settings_backed_up_and_replaced() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());
        fs::write(store.document_path(SETTINGS_DOC), "system-monitor: \"not a map\"\n").unwrap();

        let settings = store.load_settings().unwrap();
        assert_eq!(settings, SettingsData::default());

        let saved = backups(temp.path(), SETTINGS_DOC);
        assert_eq!(saved.len(), 1);
        assert!(fs::read_to_string(&saved[0]).unwrap().contains("not a map"));

        let rewritten = fs::read_to_string(store.document_path(SETTINGS_DOC)).unwrap();
        assert!(rewritten.contains("cpu-threshold: 85"));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());
        fs::write(
            store.document_path(SETTINGS_DOC),
            "window:\n  width: 20\nsystem-monitor:\n  cpu-threshold: 999\n",
        )
        .unwrap();

        let settings = store.load_settings().unwrap();
        assert_eq!(settings.system_monitor.cpu_threshold, 95);
        assert_eq!(settings.window.width, 100.0);
        assert_eq!(settings.system_monitor.ram_threshold, 85);

        let reread: SettingsData =
            serde_yaml::from_str(&fs::read_to_string(store.document_path(SETTINGS_DOC)).unwrap()).unwrap();
        assert_eq!(reread.system_monitor.cpu_threshold, 95);
    }

    #[test]
    fn test_save_settings_clamps_copy() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());

        let mut settings = SettingsData::default();
        settings.window.position = SidebarPosition::Left;
        settings.system_monitor.ping_threshold = 10_000;
        store.save_settings(&settings).unwrap();
        assert_eq!(settings.system_monitor.ping_threshold, 10_000);

        let loaded = store.load_settings().unwrap();
        assert_eq!(loaded.window.position, SidebarPosition::Left);
        assert_eq!(loaded.system_monitor.ping_threshold, 500);
    }

    #[test]
    fn test_write_document_leaves_no_temp_file() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());

        store.write_document("custom", "a: 1\n").unwrap();
        store.write_document("custom", "a: 2\n").unwrap();

        assert_eq!(fs::read_to_string(store.document_path("custom")).unwrap(), "a: 2\n");
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_backup_document_missing_is_none() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());
        assert!(store.backup_document(SETTINGS_DOC).unwrap().is_none());
    }

    #[test]
    fn test_reset_settings_backs_up_first() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());

        let mut settings = SettingsData::default();
        settings.window.width = 180.0;
        store.save_settings(&settings).unwrap();

        let reset = store.reset_settings().unwrap();
        assert_eq!(reset, SettingsData::default());
        assert_eq!(backups(temp.path(), SETTINGS_DOC).len(), 1);
        assert_eq!(store.load_settings().unwrap().window.width, 122.0);
    }

    #[test]
    fn test_shortcuts_default_and_roundtrip() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());

        let mut data = store.load_shortcuts().unwrap();
        assert_eq!(data.shortcuts.len(), 4);

        data.add_shortcut("Docs", "https://docs.rs", "builtin", "📚");
        store.save_shortcuts(&data).unwrap();

        let loaded = store.load_shortcuts().unwrap();
        assert_eq!(loaded.shortcuts.len(), 5);
        assert_eq!(loaded.shortcuts[4].label, "Docs");
    }

    #[test]
    fn test_load_shortcuts_drops_broken_entries() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());

        let mut data = ShortcutsData::create_default();
        data.add_shortcut("Gone", "/definitely/not/here/app", "builtin", "x");
        store.save_shortcuts(&data).unwrap();

        let loaded = store.load_shortcuts().unwrap();
        assert_eq!(loaded.shortcuts.len(), 4);
        assert!(loaded.shortcuts.iter().all(|s| s.label != "Gone"));
    }

    #[test]
    fn test_notes_recover_default_tab() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());

        let notes = store.load_notes().unwrap();
        assert_eq!(notes.tabs.len(), 1);
        assert_eq!(notes.tabs[0].content, DEFAULT_NOTE);

        store.write_document(NOTES_DOC, "tabs: []\nlast-active-tab: 3\n").unwrap();
        let notes = store.load_notes().unwrap();
        assert_eq!(notes.tabs.len(), 1);
        assert!(notes.tabs[0].is_default);
        assert_eq!(notes.last_active_tab, 0);
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::new(temp.path());

        let mut settings = SettingsData::default();
        settings.system_monitor.update_frequency_seconds = 5;
        store.save_settings_async(settings).await.unwrap();

        let loaded = store.load_settings_async().await.unwrap();
        assert_eq!(loaded.system_monitor.update_frequency_seconds, 5);
    }
}
