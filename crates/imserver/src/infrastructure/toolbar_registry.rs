//! In-memory toolbar registry.
//!
//! Stores descriptor paths and item attribute overrides per global toolbar
//! id. Descriptor files are not parsed here; whoever renders the toolbar
//! reads them from [`ToolbarData::descriptor_path`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use imserver_core::{ToolbarData, ToolbarId, Variant};
use tracing::debug;

use crate::application::toolbar_bindings::ToolbarRegistry;

#[derive(Default)]
pub struct InMemoryToolbarRegistry {
    toolbars: Mutex<HashMap<ToolbarId, Arc<ToolbarData>>>,
}

impl InMemoryToolbarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.toolbars().len()
    }

    pub fn is_empty(&self) -> bool {
        self.toolbars().is_empty()
    }

    fn toolbars(&self) -> MutexGuard<'_, HashMap<ToolbarId, Arc<ToolbarData>>> {
        self.toolbars.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ToolbarRegistry for InMemoryToolbarRegistry {
    fn contains(&self, id: &ToolbarId) -> bool {
        self.toolbars().contains_key(id)
    }

    fn register_toolbar(&self, id: &ToolbarId, descriptor_path: &str) {
        debug!("toolbar {id} -> {descriptor_path}");
        self.toolbars().insert(
            id.clone(),
            Arc::new(ToolbarData::new(id.clone(), descriptor_path)),
        );
    }

    fn unregister_toolbar(&self, id: &ToolbarId) {
        self.toolbars().remove(id);
    }

    fn toolbar_data(&self, id: &ToolbarId) -> Option<Arc<ToolbarData>> {
        self.toolbars().get(id).cloned()
    }

    fn set_toolbar_item_attribute(
        &self,
        id: &ToolbarId,
        item: &str,
        attribute: &str,
        value: &Variant,
    ) {
        let mut toolbars = self.toolbars();
        let Some(data) = toolbars.get_mut(id) else {
            debug!("attribute {item}.{attribute} for unknown toolbar {id}");
            return;
        };
        // Copy on write: data already handed to targets keeps its snapshot.
        Arc::make_mut(data)
            .item_attributes
            .entry(item.to_string())
            .or_default()
            .insert(attribute.to_string(), value.clone());
    }
}
