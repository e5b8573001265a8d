//! Shortcuts widget

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use settingsstore::{SHORTCUTS_DOC, ShortcutItem, ShortcutsData};
use tracing::{debug, info};

use super::SHORTCUTS;
use crate::coordinator::SaveReceipt;
use crate::lifecycle::{WidgetContext, WidgetFactory};
use crate::widget::{InitPhase, Surface, Widget, WidgetError, WidgetMetadata};

/// One surface line per shortcut
pub fn render(data: &ShortcutsData) -> Vec<String> {
    if data.shortcuts.is_empty() {
        return vec!["(no shortcuts)".to_string()];
    }
    data.shortcuts
        .iter()
        .map(|s| {
            if s.icon_value.is_empty() {
                s.label.clone()
            } else {
                format!("{} {}", s.icon_value, s.label)
            }
        })
        .collect()
}

pub struct ShortcutsWidget {
    ctx: WidgetContext,
    surface: Surface,
    data: Mutex<ShortcutsData>,
}

impl ShortcutsWidget {
    pub fn new(ctx: WidgetContext) -> Self {
        Self {
            ctx,
            surface: Surface::new(),
            data: Mutex::new(ShortcutsData::default()),
        }
    }

    pub fn describe() -> WidgetMetadata {
        WidgetMetadata::builtin("Launcher for files, folders and URLs")
            .depends_on(["persistence"])
    }

    pub fn factory() -> WidgetFactory {
        WidgetFactory::new(SHORTCUTS, InitPhase::Local, |ctx| {
            Ok(Arc::new(ShortcutsWidget::new(ctx.clone())) as Arc<dyn Widget>)
        })
        .with_metadata(Self::describe())
    }

    fn data(&self) -> MutexGuard<'_, ShortcutsData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(&self, data: &ShortcutsData) -> Result<SaveReceipt, WidgetError> {
        self.surface.set_lines(render(data));
        let payload = serde_yaml::to_string(data).map_err(|e| WidgetError::Other(e.to_string()))?;
        self.ctx
            .coordinator
            .queue_save(SHORTCUTS_DOC, payload)
            .map_err(|e| WidgetError::Other(e.to_string()))
    }

    pub fn add(&self, label: &str, path: &str, icon_value: &str) -> Result<(ShortcutItem, SaveReceipt), WidgetError> {
        debug!(%label, %path, "ShortcutsWidget::add: called");
        let mut data = self.data();
        let item = data.add_shortcut(label, path, "builtin", icon_value);
        let receipt = self.commit(&data)?;
        Ok((item, receipt))
    }

    pub fn remove(&self, id: &str) -> Result<Option<SaveReceipt>, WidgetError> {
        debug!(%id, "ShortcutsWidget::remove: called");
        let mut data = self.data();
        if !data.remove_shortcut(id) {
            return Ok(None);
        }
        self.commit(&data).map(Some)
    }

    pub fn reorder(&self, ids: &[String]) -> Result<SaveReceipt, WidgetError> {
        debug!(count = ids.len(), "ShortcutsWidget::reorder: called");
        let mut data = self.data();
        data.reorder(ids);
        self.commit(&data)
    }

    pub fn snapshot(&self) -> ShortcutsData {
        self.data().clone()
    }
}

#[async_trait]
impl Widget for ShortcutsWidget {
    fn name(&self) -> &str {
        SHORTCUTS
    }

    fn phase(&self) -> InitPhase {
        InitPhase::Local
    }

    fn metadata(&self) -> WidgetMetadata {
        Self::describe()
    }

    fn surface(&self) -> Surface {
        self.surface.clone()
    }

    async fn initialize(&self) -> Result<(), WidgetError> {
        debug!("ShortcutsWidget::initialize: called");
        let store = self.ctx.store.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load_shortcuts())
            .await
            .map_err(|e| WidgetError::Other(e.to_string()))??;
        self.surface.set_lines(render(&loaded));
        info!(count = loaded.shortcuts.len(), "Loaded shortcuts");
        *self.data() = loaded;
        Ok(())
    }

    fn dispose(&self) -> Result<(), WidgetError> {
        Ok(())
    }

    async fn refresh(&self) -> Result<(), WidgetError> {
        let data = self.snapshot();
        self.surface.set_lines(render(&data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, CoordinatorConfig};
    use settingsstore::SettingsStore;
    use tempfile::tempdir;

    fn widget(dir: &std::path::Path) -> ShortcutsWidget {
        let coordinator = Coordinator::new(CoordinatorConfig::default(), SettingsStore::new(dir));
        ShortcutsWidget::new(WidgetContext::new(coordinator))
    }

    #[test]
    fn test_render_empty_and_icons() {
        assert_eq!(render(&ShortcutsData::default()), vec!["(no shortcuts)"]);
        let data = ShortcutsData::create_default();
        let lines = render(&data);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("Calculator"));
    }

    #[tokio::test]
    async fn test_add_and_remove_persist() {
        let temp = tempdir().unwrap();
        let shortcuts = widget(temp.path());
        shortcuts.initialize().await.unwrap();
        assert_eq!(shortcuts.snapshot().shortcuts.len(), 4);

        let (item, receipt) = shortcuts.add("Docs", "https://docs.rs", "").unwrap();
        assert!(receipt.wait().await);
        assert_eq!(SettingsStore::new(temp.path()).load_shortcuts().unwrap().shortcuts.len(), 5);

        let receipt = shortcuts.remove(&item.id).unwrap().unwrap();
        assert!(receipt.wait().await);
        assert!(shortcuts.remove(&item.id).unwrap().is_none());
        assert_eq!(SettingsStore::new(temp.path()).load_shortcuts().unwrap().shortcuts.len(), 4);
    }

    #[tokio::test]
    async fn test_reorder() {
        let temp = tempdir().unwrap();
        let shortcuts = widget(temp.path());
        shortcuts.initialize().await.unwrap();

        let mut ids: Vec<String> = shortcuts.snapshot().shortcuts.iter().map(|s| s.id.clone()).collect();
        ids.reverse();
        shortcuts.reorder(&ids).unwrap().wait().await;
        assert_eq!(shortcuts.snapshot().shortcuts[0].label, "Command Prompt");
    }
}
