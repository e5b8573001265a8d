//! Widget catalog and display priorities

use std::collections::HashMap;
use std::sync::Arc;

use settingsstore::SettingsStore;
use tracing::debug;

use crate::coordinator::Coordinator;
use crate::widget::{InitPhase, Widget, WidgetError, WidgetMetadata};

/// Rank given to names missing from the priority table
pub const UNRANKED: u32 = u32::MAX;

/// What a factory receives when constructing a widget
#[derive(Clone)]
pub struct WidgetContext {
    pub coordinator: Coordinator,
    pub store: SettingsStore,
}

impl WidgetContext {
    pub fn new(coordinator: Coordinator) -> Self {
        let store = coordinator.store().clone();
        Self { coordinator, store }
    }
}

type ConstructFn = dyn Fn(&WidgetContext) -> Result<Arc<dyn Widget>, WidgetError> + Send + Sync;

/// Constructor for one widget implementation
#[derive(Clone)]
pub struct WidgetFactory {
    pub name: String,
    pub phase: InitPhase,
    pub metadata: WidgetMetadata,
    construct: Arc<ConstructFn>,
}

impl WidgetFactory {
    pub fn new<F>(name: impl Into<String>, phase: InitPhase, construct: F) -> Self
    where
        F: Fn(&WidgetContext) -> Result<Arc<dyn Widget>, WidgetError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            phase,
            metadata: WidgetMetadata::default(),
            construct: Arc::new(construct),
        }
    }

    /// Describe the widget without constructing it
    pub fn with_metadata(mut self, metadata: WidgetMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn construct(&self, ctx: &WidgetContext) -> Result<Arc<dyn Widget>, WidgetError> {
        debug!(name = %self.name, "WidgetFactory::construct: called");
        (self.construct)(ctx)
    }
}

impl std::fmt::Debug for WidgetFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetFactory")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Ordered set of factories; insertion order is discovery order
#[derive(Debug, Clone, Default)]
pub struct WidgetCatalog {
    factories: Vec<WidgetFactory>,
}

impl WidgetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: WidgetFactory) -> &mut Self {
        debug!(name = %factory.name, phase = %factory.phase, "WidgetCatalog::register: called");
        self.factories.push(factory);
        self
    }

    /// Catalog without the named widgets
    pub fn without(mut self, disabled: &[String]) -> Self {
        self.factories
            .retain(|f| !disabled.iter().any(|d| d.eq_ignore_ascii_case(&f.name)));
        self
    }

    pub fn factories(&self) -> &[WidgetFactory] {
        &self.factories
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Fixed display ranks by widget name
#[derive(Debug, Clone)]
pub struct PriorityTable {
    ranks: HashMap<String, u32>,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::from_pairs([("Clock", 1), ("Weather", 2), ("Stocks", 3), ("Notes", 4), ("Shortcuts", 5)])
    }
}

impl PriorityTable {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            ranks: pairs.into_iter().map(|(name, rank)| (name.into(), rank)).collect(),
        }
    }

    /// Apply overrides on top of the current table
    pub fn with_overrides(mut self, overrides: &HashMap<String, u32>) -> Self {
        for (name, rank) in overrides {
            self.ranks.insert(name.clone(), *rank);
        }
        self
    }

    pub fn rank(&self, name: &str) -> u32 {
        self.ranks.get(name).copied().unwrap_or(UNRANKED)
    }

    /// Stable sort by rank; unknown names keep their relative order
    pub fn sort<T>(&self, items: &mut [T], name_of: impl Fn(&T) -> &str) {
        items.sort_by_key(|item| self.rank(name_of(item)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_order() {
        let table = PriorityTable::default();
        let mut names = vec!["Weather", "Clock", "Stocks"];
        table.sort(&mut names, |n| *n);
        assert_eq!(names, vec!["Clock", "Weather", "Stocks"]);
    }

    #[test]
    fn test_unknown_after_known_keeping_discovery_order() {
        let table = PriorityTable::default();
        let mut names = vec!["Zeta", "System Monitor", "Notes", "Alpha", "Clock"];
        table.sort(&mut names, |n| *n);
        assert_eq!(names, vec!["Clock", "Notes", "Zeta", "System Monitor", "Alpha"]);
    }

    #[test]
    fn test_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("System Monitor".to_string(), 0);
        let table = PriorityTable::default().with_overrides(&overrides);
        assert_eq!(table.rank("System Monitor"), 0);
        assert_eq!(table.rank("Clock"), 1);
        assert_eq!(table.rank("nope"), UNRANKED);
    }

    #[test]
    fn test_catalog_without_is_case_insensitive() {
        let mut catalog = WidgetCatalog::new();
        catalog
            .register(WidgetFactory::new("Weather", InitPhase::Remote, |_| {
                Err(WidgetError::Other("unused".into()))
            }))
            .register(WidgetFactory::new("Clock", InitPhase::Local, |_| {
                Err(WidgetError::Other("unused".into()))
            }));

        let catalog = catalog.without(&["weather".to_string()]);
        assert_eq!(catalog.names(), vec!["Clock"]);
    }

    proptest! {
        #[test]
        fn prop_order_independent_of_enumeration(perm in Just(vec!["Weather", "Clock", "Stocks"]).prop_shuffle()) {
            let table = PriorityTable::default();
            let mut names = perm;
            table.sort(&mut names, |n| *n);
            prop_assert_eq!(names, vec!["Clock", "Weather", "Stocks"]);
        }
    }
}
