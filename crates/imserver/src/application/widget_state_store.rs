//! Widget state store: the latest attribute snapshot and the toolbar in use.
//!
//! The snapshot is published through a `tokio::sync::watch` channel so that
//! in-process consumers (the input method UI, diagnostics) can read the
//! current state without a round trip through the broker loop.

use std::sync::Arc;

use imserver_core::{ToolbarId, WidgetState};
use tokio::sync::watch;

use super::connection_registry::ConnectionId;

/// What changed between the previous and the new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetStateDelta {
    /// New visualization priority, if it differs from the previous one.
    pub visualization_priority: Option<bool>,
    /// New global toolbar id, if it differs from the one in use.
    pub toolbar: Option<ToolbarId>,
}

/// Holds the snapshot last pushed by any connection.
#[derive(Debug)]
pub struct WidgetStateStore {
    state: watch::Sender<Arc<WidgetState>>,
    source: Option<ConnectionId>,
    toolbar_id: ToolbarId,
}

impl Default for WidgetStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetStateStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Arc::new(WidgetState::new()));
        Self {
            state,
            source: None,
            toolbar_id: ToolbarId::default(),
        }
    }

    /// Replaces the snapshot wholesale and reports the deltas.
    ///
    /// The toolbar id in use is *not* updated here; call
    /// [`set_toolbar_id`](Self::set_toolbar_id) once the new toolbar has been
    /// resolved.
    pub fn replace(&mut self, connection: ConnectionId, new_state: WidgetState) -> WidgetStateDelta {
        let old_visualization = self.state.borrow().visualization_priority().unwrap_or(false);
        let new_visualization = new_state.visualization_priority().unwrap_or(false);

        let new_toolbar = new_state
            .toolbar_local_id()
            .map(|local| ToolbarId::new(local, connection.to_string()))
            .unwrap_or_default();

        self.source = Some(connection);
        self.state.send_replace(Arc::new(new_state));

        WidgetStateDelta {
            visualization_priority: (old_visualization != new_visualization)
                .then_some(new_visualization),
            toolbar: (self.toolbar_id != new_toolbar).then_some(new_toolbar),
        }
    }

    /// Current snapshot.
    pub fn current(&self) -> Arc<WidgetState> {
        Arc::clone(&self.state.borrow())
    }

    /// Receiver that observes every replacement.
    pub fn subscribe(&self) -> watch::Receiver<Arc<WidgetState>> {
        self.state.subscribe()
    }

    /// Connection that pushed the current snapshot.
    pub fn source(&self) -> Option<ConnectionId> {
        self.source
    }

    /// Global id of the toolbar currently shown.
    pub fn toolbar_id(&self) -> &ToolbarId {
        &self.toolbar_id
    }

    pub fn set_toolbar_id(&mut self, id: ToolbarId) {
        self.toolbar_id = id;
    }
}
