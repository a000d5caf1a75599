//! Framework targets: the input method plugins observing the broker.
//!
//! Every notification is broadcast to all registered targets in registration
//! order. A round iterates a snapshot of the list, so a target added or
//! removed while a round is running does not change who receives that round.

use std::sync::{Arc, Mutex, PoisonError};

use imserver_core::protocol::messages::KeyEvent;
use imserver_core::{Point, Rect, ToolbarData};

/// Capability set of an input method plugin. Every method defaults to a
/// no-op so a target only overrides what it cares about.
#[allow(unused_variables)]
pub trait InputMethodTarget: Send + Sync {
    /// The active input context changed (or was cleared).
    fn client_changed(&self) {}

    fn mouse_clicked_on_preedit(&self, pos: Point, preedit_rect: Rect) {}

    fn set_preedit(&self, text: &str) {}

    fn reset(&self) {}

    fn focus_changed(&self, focused: bool) {}

    fn visualization_priority_changed(&self, priority: bool) {}

    /// Toolbar to show; `None` when the widget has none or it is unknown.
    fn set_toolbar(&self, toolbar: Option<Arc<ToolbarData>>) {}

    /// Generic "widget state updated" notification, always sent last.
    fn update(&self) {}

    fn app_orientation_changed(&self, angle: i32) {}

    fn set_copy_paste_state(&self, copy_available: bool, paste_available: bool) {}

    fn process_key_event(&self, event: &KeyEvent, native_scan_code: u32, native_modifiers: u32) {}
}

/// Handle returned by [`TargetList::add`], used to remove the target again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

#[derive(Default)]
struct Entries {
    next_id: u64,
    items: Vec<(TargetId, Arc<dyn InputMethodTarget>)>,
}

/// Cloneable, shared list of targets.
#[derive(Clone, Default)]
pub struct TargetList {
    inner: Arc<Mutex<Entries>>,
}

impl TargetList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, target: Arc<dyn InputMethodTarget>) -> TargetId {
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = TargetId(entries.next_id);
        entries.next_id += 1;
        entries.items.push((id, target));
        id
    }

    /// Removes a target. Returns `false` if it was not registered.
    pub fn remove(&self, id: TargetId) -> bool {
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.items.len();
        entries.items.retain(|(entry_id, _)| *entry_id != id);
        entries.items.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `f` on every target of a snapshot taken before the round starts.
    pub fn for_each(&self, mut f: impl FnMut(&dyn InputMethodTarget)) {
        let snapshot: Vec<Arc<dyn InputMethodTarget>> = {
            let entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            entries.items.iter().map(|(_, t)| Arc::clone(t)).collect()
        };
        for target in &snapshot {
            f(target.as_ref());
        }
    }
}
