//! Toolbar binding manager.
//!
//! Input contexts number their toolbars locally. The manager turns a local
//! id into a global [`ToolbarId`] by pairing it with the calling
//! connection's identity, forwards registrations to the external
//! [`ToolbarRegistry`], and remembers which global ids it registered itself.
//!
//! That ownership set is the gate for unregistering and for attribute
//! updates: a connection can only touch toolbars registered under its own
//! identity, and calls for anything else are silently ignored.

use std::collections::HashSet;
use std::sync::Arc;

use imserver_core::{ToolbarData, ToolbarId, Variant};
use tracing::debug;

use super::connection_registry::ConnectionId;

/// External store of toolbar definitions.
///
/// Implementations use interior mutability; the broker calls them from its
/// single dispatch task.
#[cfg_attr(test, mockall::automock)]
pub trait ToolbarRegistry: Send + Sync {
    fn contains(&self, id: &ToolbarId) -> bool;

    fn register_toolbar(&self, id: &ToolbarId, descriptor_path: &str);

    fn unregister_toolbar(&self, id: &ToolbarId);

    /// Toolbar data for `id`, or `None` when unknown.
    fn toolbar_data(&self, id: &ToolbarId) -> Option<Arc<ToolbarData>>;

    fn set_toolbar_item_attribute(
        &self,
        id: &ToolbarId,
        item: &str,
        attribute: &str,
        value: &Variant,
    );
}

/// Global id of toolbar `local_id` of `connection`.
pub fn global_toolbar_id(connection: ConnectionId, local_id: i32) -> ToolbarId {
    ToolbarId::new(local_id, connection.to_string())
}

pub struct ToolbarBindingManager {
    registry: Arc<dyn ToolbarRegistry>,
    owned: HashSet<ToolbarId>,
}

impl ToolbarBindingManager {
    pub fn new(registry: Arc<dyn ToolbarRegistry>) -> Self {
        Self {
            registry,
            owned: HashSet::new(),
        }
    }

    /// Registers a toolbar unless the id is invalid or already owned.
    /// Returns whether the registry was called.
    pub fn register_toolbar(
        &mut self,
        connection: ConnectionId,
        local_id: i32,
        descriptor_path: &str,
    ) -> bool {
        let id = global_toolbar_id(connection, local_id);
        if !id.is_valid() || self.owned.contains(&id) {
            debug!("not registering toolbar {id}");
            return false;
        }
        self.registry.register_toolbar(&id, descriptor_path);
        debug!("registered toolbar {id} from {descriptor_path:?}");
        self.owned.insert(id);
        true
    }

    /// Unregisters a toolbar this manager owns. Returns whether it did.
    pub fn unregister_toolbar(&mut self, connection: ConnectionId, local_id: i32) -> bool {
        let id = global_toolbar_id(connection, local_id);
        if !id.is_valid() || !self.owned.remove(&id) {
            return false;
        }
        self.registry.unregister_toolbar(&id);
        debug!("unregistered toolbar {id}");
        true
    }

    /// Forwards an item attribute change for an owned toolbar. Returns
    /// whether it was forwarded.
    pub fn set_toolbar_item_attribute(
        &self,
        connection: ConnectionId,
        local_id: i32,
        item: &str,
        attribute: &str,
        value: &Variant,
    ) -> bool {
        let id = global_toolbar_id(connection, local_id);
        if !id.is_valid() || !self.owned.contains(&id) {
            return false;
        }
        self.registry
            .set_toolbar_item_attribute(&id, item, attribute, value);
        true
    }

    /// Unregisters every toolbar owned by `connection`. Returns how many
    /// were released.
    pub fn release_connection(&mut self, connection: ConnectionId) -> usize {
        let service = connection.to_string();
        let released: Vec<ToolbarId> = self
            .owned
            .iter()
            .filter(|id| id.service == service)
            .cloned()
            .collect();
        for id in &released {
            self.owned.remove(id);
            self.registry.unregister_toolbar(id);
            debug!("released toolbar {id}");
        }
        released.len()
    }

    /// Whether this manager registered `id`.
    pub fn owns(&self, id: &ToolbarId) -> bool {
        self.owned.contains(id)
    }

    /// Whether the external registry currently knows `id`.
    pub fn registry_contains(&self, id: &ToolbarId) -> bool {
        self.registry.contains(id)
    }

    /// Toolbar data for `id`; `None` for invalid or unknown ids.
    pub fn toolbar_data(&self, id: &ToolbarId) -> Option<Arc<ToolbarData>> {
        if !id.is_valid() {
            return None;
        }
        self.registry.toolbar_data(id)
    }
}
