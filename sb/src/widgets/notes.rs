//! Notes widget

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use settingsstore::notes::MAX_TABS;
use settingsstore::{NOTES_DOC, NoteTab, NotesData};
use tracing::{debug, info};

use super::NOTES;
use crate::coordinator::{Coordinator, SaveReceipt};
use crate::lifecycle::{WidgetContext, WidgetFactory};
use crate::widget::{InitPhase, Surface, Widget, WidgetError, WidgetMetadata};

/// Number of content lines shown for the active tab
const PREVIEW_LINES: usize = 3;

pub struct NotesWidget {
    ctx: WidgetContext,
    surface: Surface,
    data: Mutex<NotesData>,
}

impl NotesWidget {
    pub fn new(ctx: WidgetContext) -> Self {
        Self {
            ctx,
            surface: Surface::new(),
            data: Mutex::new(NotesData::default()),
        }
    }

    pub fn describe() -> WidgetMetadata {
        WidgetMetadata::builtin("Tabbed scratch notes saved as you type")
            .depends_on(["persistence"])
    }

    pub fn factory() -> WidgetFactory {
        WidgetFactory::new(NOTES, InitPhase::Local, |ctx| {
            Ok(Arc::new(NotesWidget::new(ctx.clone())) as Arc<dyn Widget>)
        })
        .with_metadata(Self::describe())
    }

    fn data(&self) -> MutexGuard<'_, NotesData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn coordinator(&self) -> &Coordinator {
        &self.ctx.coordinator
    }

    fn render(&self, data: &mut NotesData) {
        let tab_count = data.tabs.len();
        let active = data.active_tab().clone();
        let title = if active.title.is_empty() {
            "Notes".to_string()
        } else {
            active.title.clone()
        };
        let mut lines = vec![format!("{} ({} tabs)", title, tab_count)];
        lines.extend(active.content.lines().take(PREVIEW_LINES).map(str::to_string));
        self.surface.set_lines(lines);
    }

    /// Persist the current document through the coordinator and re-render
    fn commit(&self, data: &mut NotesData) -> Result<SaveReceipt, WidgetError> {
        self.render(data);
        let payload = serde_yaml::to_string(&*data).map_err(|e| WidgetError::Other(e.to_string()))?;
        self.coordinator()
            .queue_save(NOTES_DOC, payload)
            .map_err(|e| WidgetError::Other(e.to_string()))
    }

    /// Add an empty tab; `None` when the tab limit is reached
    pub fn add_tab(&self) -> Result<Option<NoteTab>, WidgetError> {
        debug!("NotesWidget::add_tab: called");
        let mut data = self.data();
        let Some(tab) = data.add_tab(MAX_TABS).cloned() else {
            return Ok(None);
        };
        self.commit(&mut data)?;
        Ok(Some(tab))
    }

    pub fn remove_tab(&self, id: &str) -> Result<bool, WidgetError> {
        debug!(%id, "NotesWidget::remove_tab: called");
        let mut data = self.data();
        if !data.remove_tab(id) {
            return Ok(false);
        }
        self.commit(&mut data)?;
        Ok(true)
    }

    /// Replace a tab's content; rapid edits coalesce into one write
    pub fn update_content(&self, id: &str, content: &str) -> Result<Option<SaveReceipt>, WidgetError> {
        debug!(%id, bytes = content.len(), "NotesWidget::update_content: called");
        let mut data = self.data();
        if !data.update_content(id, content) {
            return Ok(None);
        }
        self.commit(&mut data).map(Some)
    }

    pub fn snapshot(&self) -> NotesData {
        self.data().clone()
    }
}

#[async_trait]
impl Widget for NotesWidget {
    fn name(&self) -> &str {
        NOTES
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
        debug!("NotesWidget::initialize: called");
        let store = self.ctx.store.clone();
        let mut loaded = tokio::task::spawn_blocking(move || store.load_notes())
            .await
            .map_err(|e| WidgetError::Other(e.to_string()))??;
        self.render(&mut loaded);
        info!(tabs = loaded.tabs.len(), "Loaded notes");
        *self.data() = loaded;
        Ok(())
    }

    fn dispose(&self) -> Result<(), WidgetError> {
        Ok(())
    }

    async fn refresh(&self) -> Result<(), WidgetError> {
        let mut data = self.data();
        self.render(&mut data);
        Ok(())
    }
}
