//! Registry of live window views.
//!
//! An explicit object owned by each `SluiceDb` instance, deliberately not
//! process-global, so independent database instances (and tests) have
//! independent view namespaces.

use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::error::DbError;
use crate::view::{FireScheduler, WindowView};

/// A registered view: its runtime plus the scheduler driving it.
pub(crate) struct RegisteredView {
    pub view: Arc<WindowView>,
    pub scheduler: FireScheduler,
}

/// View name → registered view, with a source-table lookup on the side.
#[derive(Default)]
pub(crate) struct ViewRegistry {
    views: RwLock<FxHashMap<String, Arc<RegisteredView>>>,
}

impl ViewRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a view under its name. The existence check and the
    /// insert share one write lock, so concurrent creates cannot both
    /// claim a name.
    pub(crate) fn insert(&self, registered: Arc<RegisteredView>) -> Result<(), DbError> {
        let name = registered.view.name().to_string();
        let mut views = self.views.write();
        if views.contains_key(&name) {
            return Err(DbError::ViewAlreadyExists(name));
        }
        views.insert(name, registered);
        Ok(())
    }

    /// Deregisters and returns a view; the caller tears it down.
    pub(crate) fn remove(&self, name: &str) -> Option<Arc<RegisteredView>> {
        self.views.write().remove(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<RegisteredView>> {
        self.views.read().get(name).cloned()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.views.read().contains_key(name)
    }

    /// Views whose source is `table`, for insert routing.
    pub(crate) fn watchers_of(&self, table: &str) -> Vec<Arc<RegisteredView>> {
        self.views
            .read()
            .values()
            .filter(|r| r.view.source() == table)
            .cloned()
            .collect()
    }

    /// Name of some view watching `table`, if any.
    pub(crate) fn watcher_name(&self, table: &str) -> Option<String> {
        self.views
            .read()
            .values()
            .find(|r| r.view.source() == table)
            .map(|r| r.view.name().to_string())
    }

    /// All view names, unsorted.
    pub(crate) fn names(&self) -> Vec<String> {
        self.views.read().keys().cloned().collect()
    }

    /// Drains every registered view (database shutdown).
    pub(crate) fn drain(&self) -> Vec<Arc<RegisteredView>> {
        self.views.write().drain().map(|(_, v)| v).collect()
    }
}
