//! Recording test doubles for the broker's collaborators.
//!
//! Each double records what it was asked to do in an `Arc<Mutex<Vec<_>>>`
//! so a test can assert on the exact sequence afterwards. They are public so
//! that the integration tests under `tests/` can use them too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use imserver_core::protocol::messages::{ContextMessage, KeyEvent, PreeditRectangle};
use imserver_core::{Point, Rect, ToolbarData, ToolbarId, Variant};

use super::channel::{ChannelError, ContextChannel};
use super::host::ApplicationHost;
use super::targets::InputMethodTarget;
use super::toolbar_bindings::ToolbarRegistry;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Channel ───────────────────────────────────────────────────────────────────

/// A [`ContextChannel`] that records every outbound call.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<ContextMessage>>,
    peer_gone: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    preedit_reply: Mutex<Option<PreeditRectangle>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all calls sent so far.
    pub fn sent(&self) -> Vec<ContextMessage> {
        lock(&self.sent).clone()
    }

    pub fn clear(&self) {
        lock(&self.sent).clear();
    }

    /// Makes every later send fail as if the peer had disconnected.
    pub fn disconnect_peer(&self) {
        self.peer_gone.store(true, Ordering::SeqCst);
    }

    /// Reply for the next preedit rectangle queries. Without one, queries
    /// time out.
    pub fn set_preedit_reply(&self, reply: PreeditRectangle) {
        *lock(&self.preedit_reply) = Some(reply);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), ChannelError> {
        if self.peer_gone.load(Ordering::SeqCst) || self.is_closed() {
            Err(ChannelError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContextChannel for RecordingChannel {
    fn send(&self, message: ContextMessage) -> Result<(), ChannelError> {
        self.check_open()?;
        lock(&self.sent).push(message);
        Ok(())
    }

    async fn query_preedit_rectangle(
        &self,
        timeout: Duration,
    ) -> Result<PreeditRectangle, ChannelError> {
        self.check_open()?;
        lock(&self.sent).push(ContextMessage::PreeditRectangle);
        let reply = *lock(&self.preedit_reply);
        reply.ok_or(ChannelError::Timeout(timeout))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Framework target ──────────────────────────────────────────────────────────

/// One notification received by a [`RecordingTarget`].
#[derive(Debug, Clone, PartialEq)]
pub enum TargetEvent {
    ClientChanged,
    MouseClickedOnPreedit(Point, Rect),
    SetPreedit(String),
    Reset,
    FocusChanged(bool),
    VisualizationPriorityChanged(bool),
    /// Id of the toolbar data handed over, `None` for no toolbar.
    SetToolbar(Option<ToolbarId>),
    Update,
    AppOrientationChanged(i32),
    SetCopyPasteState(bool, bool),
    ProcessKeyEvent(KeyEvent, u32, u32),
}

/// An [`InputMethodTarget`] that records notifications in arrival order.
#[derive(Default, Clone)]
pub struct RecordingTarget {
    events: Arc<Mutex<Vec<TargetEvent>>>,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TargetEvent> {
        lock(&self.events).clone()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    fn push(&self, event: TargetEvent) {
        lock(&self.events).push(event);
    }
}

impl InputMethodTarget for RecordingTarget {
    fn client_changed(&self) {
        self.push(TargetEvent::ClientChanged);
    }

    fn mouse_clicked_on_preedit(&self, pos: Point, preedit_rect: Rect) {
        self.push(TargetEvent::MouseClickedOnPreedit(pos, preedit_rect));
    }

    fn set_preedit(&self, text: &str) {
        self.push(TargetEvent::SetPreedit(text.to_string()));
    }

    fn reset(&self) {
        self.push(TargetEvent::Reset);
    }

    fn focus_changed(&self, focused: bool) {
        self.push(TargetEvent::FocusChanged(focused));
    }

    fn visualization_priority_changed(&self, priority: bool) {
        self.push(TargetEvent::VisualizationPriorityChanged(priority));
    }

    fn set_toolbar(&self, toolbar: Option<Arc<ToolbarData>>) {
        self.push(TargetEvent::SetToolbar(toolbar.map(|t| t.id.clone())));
    }

    fn update(&self) {
        self.push(TargetEvent::Update);
    }

    fn app_orientation_changed(&self, angle: i32) {
        self.push(TargetEvent::AppOrientationChanged(angle));
    }

    fn set_copy_paste_state(&self, copy_available: bool, paste_available: bool) {
        self.push(TargetEvent::SetCopyPasteState(copy_available, paste_available));
    }

    fn process_key_event(&self, event: &KeyEvent, native_scan_code: u32, native_modifiers: u32) {
        self.push(TargetEvent::ProcessKeyEvent(
            event.clone(),
            native_scan_code,
            native_modifiers,
        ));
    }
}

// ── Application host ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    TransientHint(i64),
    ShowRequested,
    HideRequested,
}

/// An [`ApplicationHost`] that records calls.
#[derive(Default, Clone)]
pub struct RecordingHost {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        lock(&self.events).clone()
    }
}

impl ApplicationHost for RecordingHost {
    fn set_transient_hint(&self, window_id: i64) {
        lock(&self.events).push(HostEvent::TransientHint(window_id));
    }

    fn show_input_method_requested(&self) {
        lock(&self.events).push(HostEvent::ShowRequested);
    }

    fn hide_input_method_requested(&self) {
        lock(&self.events).push(HostEvent::HideRequested);
    }
}

// ── Toolbar registry ──────────────────────────────────────────────────────────

/// One mutating call received by a [`RecordingToolbarRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryCall {
    Register(ToolbarId, String),
    Unregister(ToolbarId),
    SetItemAttribute(ToolbarId, String, String, Variant),
}

/// A working in-memory [`ToolbarRegistry`] that also records mutating calls.
#[derive(Default, Clone)]
pub struct RecordingToolbarRegistry {
    calls: Arc<Mutex<Vec<RegistryCall>>>,
    toolbars: Arc<Mutex<HashMap<ToolbarId, ToolbarData>>>,
}

impl RecordingToolbarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        lock(&self.calls).clone()
    }

    /// Drops every known toolbar, as if the registry had restarted.
    pub fn forget_all(&self) {
        lock(&self.toolbars).clear();
    }
}

impl ToolbarRegistry for RecordingToolbarRegistry {
    fn contains(&self, id: &ToolbarId) -> bool {
        lock(&self.toolbars).contains_key(id)
    }

    fn register_toolbar(&self, id: &ToolbarId, descriptor_path: &str) {
        lock(&self.calls).push(RegistryCall::Register(id.clone(), descriptor_path.to_string()));
        lock(&self.toolbars).insert(id.clone(), ToolbarData::new(id.clone(), descriptor_path));
    }

    fn unregister_toolbar(&self, id: &ToolbarId) {
        lock(&self.calls).push(RegistryCall::Unregister(id.clone()));
        lock(&self.toolbars).remove(id);
    }

    fn toolbar_data(&self, id: &ToolbarId) -> Option<Arc<ToolbarData>> {
        lock(&self.toolbars).get(id).cloned().map(Arc::new)
    }

    fn set_toolbar_item_attribute(
        &self,
        id: &ToolbarId,
        item: &str,
        attribute: &str,
        value: &Variant,
    ) {
        lock(&self.calls).push(RegistryCall::SetItemAttribute(
            id.clone(),
            item.to_string(),
            attribute.to_string(),
            value.clone(),
        ));
    }
}
