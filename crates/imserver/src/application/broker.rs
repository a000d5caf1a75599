//! The input-context broker: one owner for all connection state.
//!
//! # Event model (for beginners)
//!
//! Socket tasks never touch broker state. They turn what they read into
//! [`BrokerEvent`]s and push them into a bounded `mpsc` queue. A single task
//! runs [`InputContextBroker::run`], pops one event at a time, and handles it
//! to completion before looking at the next. Because only that task mutates
//! the registry, the active context, the widget state and the toolbar
//! bindings, none of them needs a lock.
//!
//! The in-process input method talks to the broker the same way, through a
//! cloneable [`BrokerHandle`].

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use imserver_core::protocol::messages::{ContextMessage, KeyEvent, PreeditFace};
use imserver_core::protocol::variant::{deserialize_map, deserialize_variant};
use imserver_core::{Rect, WidgetState};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::active_context::{ActiveContext, GlobalCapabilities};
use super::channel::{ChannelError, ContextChannel};
use super::connection_registry::{ConnectionId, ConnectionRegistry};
use super::dispatcher::{query_preedit_rectangle, region_payload, OutboundDispatcher};
use super::host::ApplicationHost;
use super::targets::TargetList;
use super::toolbar_bindings::{ToolbarBindingManager, ToolbarRegistry};
use super::widget_state_store::WidgetStateStore;

// ── Events ────────────────────────────────────────────────────────────────────

/// Everything the broker task reacts to.
pub enum BrokerEvent {
    /// A peer was accepted. The broker registers it and answers with its id.
    Connected {
        channel: Arc<dyn ContextChannel>,
        reply: oneshot::Sender<ConnectionId>,
    },
    /// A decoded client-to-server call.
    Call {
        connection: ConnectionId,
        message: ContextMessage,
    },
    /// The transport noticed that a peer went away.
    Disconnected(ConnectionId),
    /// A request from the in-process input method.
    Command(BrokerCommand),
    Shutdown,
}

/// Requests issued by the input method through a [`BrokerHandle`].
#[derive(Debug)]
pub enum BrokerCommand {
    SendPreeditString { text: String, face: PreeditFace },
    SendCommitString(String),
    SendKeyEvent(KeyEvent),
    NotifyImInitiatedHiding,
    SetGlobalCorrectionEnabled(bool),
    SetRedirectKeys(bool),
    SetDetectableAutoRepeat(bool),
    Copy,
    Paste,
    UpdateInputMethodArea(Vec<Rect>),
    /// Preedit rectangle query. `events` lets the query report a peer that
    /// went away while the broker was not waiting on it.
    PreeditRectangle {
        reply: oneshot::Sender<Option<Rect>>,
        events: mpsc::Sender<BrokerEvent>,
    },
    CurrentActive(oneshot::Sender<Option<ConnectionId>>),
    SubscribeWidgetState(oneshot::Sender<watch::Receiver<Arc<WidgetState>>>),
}

// ── Broker ────────────────────────────────────────────────────────────────────

pub struct InputContextBroker {
    registry: ConnectionRegistry,
    active: ActiveContext,
    capabilities: GlobalCapabilities,
    widget_state: WidgetStateStore,
    toolbars: ToolbarBindingManager,
    dispatcher: OutboundDispatcher,
    targets: TargetList,
    host: Arc<dyn ApplicationHost>,
    preedit_query_timeout: Duration,
}

impl InputContextBroker {
    pub fn new(
        toolbar_registry: Arc<dyn ToolbarRegistry>,
        targets: TargetList,
        host: Arc<dyn ApplicationHost>,
        preedit_query_timeout: Duration,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            active: ActiveContext::new(),
            capabilities: GlobalCapabilities::default(),
            widget_state: WidgetStateStore::new(),
            toolbars: ToolbarBindingManager::new(toolbar_registry),
            dispatcher: OutboundDispatcher::new(),
            targets,
            host,
            preedit_query_timeout,
        }
    }

    /// Consumes events until [`BrokerEvent::Shutdown`] or until every sender
    /// is gone, then closes all remaining connections.
    pub async fn run(mut self, mut events: mpsc::Receiver<BrokerEvent>) {
        info!("input context broker running");
        while let Some(event) = events.recv().await {
            if self.handle_event(event).is_break() {
                break;
            }
        }
        self.shutdown();
        info!("input context broker stopped");
    }

    /// Handles one event to completion, including any teardown it caused.
    pub fn handle_event(&mut self, event: BrokerEvent) -> ControlFlow<()> {
        match event {
            BrokerEvent::Connected { channel, reply } => {
                let id = self.register_connection(channel);
                if reply.send(id).is_err() {
                    // The socket task gave up before learning its id.
                    self.dispatcher.schedule_teardown(id);
                }
            }
            BrokerEvent::Call {
                connection,
                message,
            } => self.handle_call(connection, message),
            BrokerEvent::Disconnected(id) => self.handle_disconnection(id),
            BrokerEvent::Command(command) => self.handle_command(command),
            BrokerEvent::Shutdown => return ControlFlow::Break(()),
        }
        self.process_pending_teardown();
        ControlFlow::Continue(())
    }

    fn handle_command(&mut self, command: BrokerCommand) {
        match command {
            BrokerCommand::SendPreeditString { text, face } => {
                self.send_preedit_string(&text, face)
            }
            BrokerCommand::SendCommitString(text) => self.send_commit_string(&text),
            BrokerCommand::SendKeyEvent(event) => self.send_key_event(event),
            BrokerCommand::NotifyImInitiatedHiding => self.notify_im_initiated_hiding(),
            BrokerCommand::SetGlobalCorrectionEnabled(enabled) => {
                self.set_global_correction_enabled(enabled)
            }
            BrokerCommand::SetRedirectKeys(enabled) => self.set_redirect_keys(enabled),
            BrokerCommand::SetDetectableAutoRepeat(enabled) => {
                self.set_detectable_auto_repeat(enabled)
            }
            BrokerCommand::Copy => self.copy(),
            BrokerCommand::Paste => self.paste(),
            BrokerCommand::UpdateInputMethodArea(region) => {
                self.update_input_method_area(&region)
            }
            BrokerCommand::PreeditRectangle { reply, events } => {
                // Awaited off the broker task; the reply is read by the
                // connection's socket task.
                let (Some(id), Some(channel)) = (self.active.current(), self.active_channel())
                else {
                    let _ = reply.send(None);
                    return;
                };
                let timeout = self.preedit_query_timeout;
                tokio::spawn(async move {
                    let rect = match query_preedit_rectangle(channel, timeout).await {
                        Ok(rect) => rect,
                        Err(ChannelError::Closed) => {
                            debug!("input context {id} closed during preedit rectangle query");
                            let _ = events.send(BrokerEvent::Disconnected(id)).await;
                            None
                        }
                        Err(e) => {
                            warn!("preedit rectangle query to input context {id} failed: {e}");
                            None
                        }
                    };
                    let _ = reply.send(rect);
                });
            }
            BrokerCommand::CurrentActive(reply) => {
                let _ = reply.send(self.current_active());
            }
            BrokerCommand::SubscribeWidgetState(reply) => {
                let _ = reply.send(self.widget_state.subscribe());
            }
        }
    }

    // ── Connections ───────────────────────────────────────────────────────────

    /// Registers an accepted peer.
    pub fn register_connection(&mut self, channel: Arc<dyn ContextChannel>) -> ConnectionId {
        let id = self.registry.register(channel);
        info!("input context {id} connected ({} live)", self.registry.len());
        id
    }

    /// Tears a connection down: release its transport and its toolbars,
    /// forget it, and clear the active context if it held it. Safe to call
    /// more than once.
    pub fn handle_disconnection(&mut self, id: ConnectionId) {
        let Some(connection) = self.registry.unregister(id) else {
            debug!("input context {id} already torn down");
            return;
        };
        connection.channel.close();
        drop(connection);
        self.toolbars.release_connection(id);

        if self.active.clear_if_active(id) {
            info!("active input context {id} disconnected");
            self.targets.for_each(|t| t.client_changed());
        } else {
            info!("input context {id} disconnected");
        }
    }

    fn process_pending_teardown(&mut self) {
        for id in self.dispatcher.take_pending_teardown() {
            self.handle_disconnection(id);
        }
    }

    fn shutdown(&mut self) {
        self.active.replace(None);
        for connection in self.registry.drain() {
            connection.channel.close();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    // ── Inbound calls ─────────────────────────────────────────────────────────

    /// Dispatches one client-to-server call.
    pub fn handle_call(&mut self, connection: ConnectionId, message: ContextMessage) {
        if !self.registry.contains(connection) {
            debug!(
                "dropping {:?} from torn down input context {connection}",
                message.message_type()
            );
            return;
        }
        debug!("input context {connection}: {:?}", message.message_type());

        match message {
            ContextMessage::ActivateContext => self.activate(Some(connection)),
            ContextMessage::ShowInputMethod => self.host.show_input_method_requested(),
            ContextMessage::HideInputMethod => self.host.hide_input_method_requested(),
            ContextMessage::MouseClickedOnPreedit { pos, preedit_rect } => self
                .targets
                .for_each(|t| t.mouse_clicked_on_preedit(pos, preedit_rect)),
            ContextMessage::SetPreedit { text } => self.targets.for_each(|t| t.set_preedit(&text)),
            ContextMessage::UpdateWidgetInformation {
                state,
                focus_changed,
            } => match deserialize_map(&state) {
                Ok(map) => self.update_widget_information(
                    connection,
                    WidgetState::from_variant_map(map),
                    focus_changed,
                ),
                Err(e) => warn!("dropping widget information from input context {connection}: {e}"),
            },
            ContextMessage::Reset => self.targets.for_each(|t| t.reset()),
            ContextMessage::AppOrientationChanged { angle } => {
                self.targets.for_each(|t| t.app_orientation_changed(angle))
            }
            ContextMessage::SetCopyPasteState {
                copy_available,
                paste_available,
            } => self
                .targets
                .for_each(|t| t.set_copy_paste_state(copy_available, paste_available)),
            ContextMessage::ProcessKeyEvent {
                event,
                native_scan_code,
                native_modifiers,
            } => self
                .targets
                .for_each(|t| t.process_key_event(&event, native_scan_code, native_modifiers)),
            ContextMessage::RegisterToolbar {
                id,
                descriptor_path,
            } => {
                self.toolbars
                    .register_toolbar(connection, id, &descriptor_path);
            }
            ContextMessage::UnregisterToolbar { id } => {
                self.toolbars.unregister_toolbar(connection, id);
            }
            ContextMessage::SetToolbarItemAttribute {
                id,
                item,
                attribute,
                value,
            } => match deserialize_variant(&value) {
                Ok(value) => {
                    self.toolbars.set_toolbar_item_attribute(
                        connection, id, &item, &attribute, &value,
                    );
                }
                Err(e) => warn!(
                    "dropping toolbar attribute {item}.{attribute} from input context {connection}: {e}"
                ),
            },
            ContextMessage::PreeditRectangleReply(_) => {
                debug!("unsolicited preedit rectangle reply from input context {connection}");
            }
            other => warn!(
                "ignoring server-side call {:?} sent by input context {connection}",
                other.message_type()
            ),
        }
    }

    // ── Active context ────────────────────────────────────────────────────────

    /// Makes `next` the active connection, or clears focus with `None`.
    pub fn activate(&mut self, next: Option<ConnectionId>) {
        if let Some(id) = next {
            if !self.registry.contains(id) {
                warn!("cannot activate unknown input context {id}");
                return;
            }
        }

        let previous = self.active.replace(next);
        if let Some(id) = next {
            for message in self.capabilities.activation_pushes() {
                self.dispatcher.send_to(&self.registry, id, message);
            }
            if let Some(previous) = previous.filter(|&p| p != id) {
                self.dispatcher
                    .send_to(&self.registry, previous, ContextMessage::ActivationLostEvent);
            }
            info!("input context {id} is active");
        } else {
            info!("no input context is active");
        }

        self.targets.for_each(|t| t.client_changed());
    }

    pub fn current_active(&self) -> Option<ConnectionId> {
        self.active.current()
    }

    fn active_channel(&self) -> Option<Arc<dyn ContextChannel>> {
        let id = self.active.current()?;
        self.registry
            .lookup(id)
            .map(|connection| Arc::clone(&connection.channel))
    }

    // ── Widget state ──────────────────────────────────────────────────────────

    /// Replaces the widget state with `state` pushed by `connection` and
    /// notifies targets about what changed. `update` always comes last.
    pub fn update_widget_information(
        &mut self,
        connection: ConnectionId,
        state: WidgetState,
        focus_changed: bool,
    ) {
        let delta = self.widget_state.replace(connection, state);
        let current = self.widget_state.current();

        if focus_changed {
            let focused = current.focus_state().unwrap_or(false);
            self.targets.for_each(|t| t.focus_changed(focused));
            self.update_transient_hint(&current);
        }

        if let Some(priority) = delta.visualization_priority {
            self.targets
                .for_each(|t| t.visualization_priority_changed(priority));
        }

        if let Some(toolbar_id) = delta.toolbar {
            let descriptor = current.toolbar_descriptor().filter(|d| !d.is_empty());
            if let (Some(descriptor), Some(local_id)) = (descriptor, current.toolbar_local_id()) {
                if !self.toolbars.registry_contains(&toolbar_id) {
                    self.toolbars
                        .register_toolbar(connection, local_id, &descriptor);
                }
            }
            let data = self.toolbars.toolbar_data(&toolbar_id);
            self.targets.for_each(|t| t.set_toolbar(data.clone()));
            self.widget_state.set_toolbar_id(toolbar_id);
        }

        self.targets.for_each(|t| t.update());
    }

    fn update_transient_hint(&self, state: &WidgetState) {
        match state.window_id() {
            Some(window_id) => self.host.set_transient_hint(window_id),
            None => debug!("no window id; transient hint unchanged"),
        }
    }

    pub fn widget_state(&self) -> &WidgetStateStore {
        &self.widget_state
    }

    pub fn toolbars(&self) -> &ToolbarBindingManager {
        &self.toolbars
    }

    // ── Outbound calls ────────────────────────────────────────────────────────

    fn send_active(&mut self, message: ContextMessage) {
        self.dispatcher
            .send_to_active(&self.registry, self.active.current(), message);
    }

    pub fn send_preedit_string(&mut self, text: &str, face: PreeditFace) {
        self.send_active(ContextMessage::UpdatePreedit {
            text: text.to_string(),
            face,
        });
    }

    pub fn send_commit_string(&mut self, text: &str) {
        self.send_active(ContextMessage::CommitString {
            text: text.to_string(),
        });
    }

    pub fn send_key_event(&mut self, event: KeyEvent) {
        self.send_active(ContextMessage::KeyEvent(event));
    }

    pub fn notify_im_initiated_hiding(&mut self) {
        self.send_active(ContextMessage::ImInitiatedHide);
    }

    pub fn set_global_correction_enabled(&mut self, enabled: bool) {
        if self.capabilities.set_correction_enabled(enabled) {
            self.send_active(ContextMessage::SetGlobalCorrectionEnabled(enabled));
        }
    }

    pub fn set_redirect_keys(&mut self, enabled: bool) {
        if self.capabilities.set_redirect_keys(enabled) {
            self.send_active(ContextMessage::SetRedirectKeys(enabled));
        }
    }

    pub fn set_detectable_auto_repeat(&mut self, enabled: bool) {
        if self.capabilities.set_detectable_auto_repeat(enabled) {
            self.send_active(ContextMessage::DetectableAutoRepeat(enabled));
        }
    }

    pub fn capabilities(&self) -> GlobalCapabilities {
        self.capabilities
    }

    pub fn copy(&mut self) {
        self.send_active(ContextMessage::Copy);
    }

    pub fn paste(&mut self) {
        self.send_active(ContextMessage::Paste);
    }

    /// Tells the active context which screen area the input method covers.
    pub fn update_input_method_area(&mut self, region: &[Rect]) {
        match region_payload(region) {
            Ok(region) => self.send_active(ContextMessage::UpdateInputMethodArea { region }),
            Err(e) => warn!("cannot encode input method area: {e}"),
        }
    }

    /// Asks the active context for its preedit rectangle, waiting at most
    /// the configured timeout. `None` when nothing is active, the reply is
    /// invalid, or the query failed.
    pub async fn preedit_rectangle(&mut self) -> Option<Rect> {
        let id = self.active.current()?;
        let channel = self.active_channel()?;
        let result = query_preedit_rectangle(channel, self.preedit_query_timeout).await;
        match result {
            Ok(rect) => rect,
            Err(ChannelError::Closed) => {
                self.dispatcher.schedule_teardown(id);
                self.process_pending_teardown();
                None
            }
            Err(e) => {
                warn!("preedit rectangle query to input context {id} failed: {e}");
                None
            }
        }
    }

    /// Runs queued teardowns. Direct callers of the outbound methods call
    /// this once their operation is complete; the event loop does it after
    /// every event.
    pub fn flush(&mut self) {
        self.process_pending_teardown();
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// The broker task has stopped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("input context broker is not running")]
pub struct BrokerClosed;

/// Cloneable front door to a running broker.
#[derive(Clone)]
pub struct BrokerHandle {
    events: mpsc::Sender<BrokerEvent>,
}

impl BrokerHandle {
    pub fn new(events: mpsc::Sender<BrokerEvent>) -> Self {
        Self { events }
    }

    /// Sender for transports that feed connection events.
    pub fn event_sender(&self) -> mpsc::Sender<BrokerEvent> {
        self.events.clone()
    }

    async fn command(&self, command: BrokerCommand) -> Result<(), BrokerClosed> {
        self.events
            .send(BrokerEvent::Command(command))
            .await
            .map_err(|_| BrokerClosed)
    }

    pub async fn send_preedit_string(
        &self,
        text: impl Into<String>,
        face: PreeditFace,
    ) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::SendPreeditString {
            text: text.into(),
            face,
        })
        .await
    }

    pub async fn send_commit_string(&self, text: impl Into<String>) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::SendCommitString(text.into()))
            .await
    }

    pub async fn send_key_event(&self, event: KeyEvent) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::SendKeyEvent(event)).await
    }

    pub async fn notify_im_initiated_hiding(&self) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::NotifyImInitiatedHiding).await
    }

    pub async fn set_global_correction_enabled(&self, enabled: bool) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::SetGlobalCorrectionEnabled(enabled))
            .await
    }

    pub async fn set_redirect_keys(&self, enabled: bool) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::SetRedirectKeys(enabled)).await
    }

    pub async fn set_detectable_auto_repeat(&self, enabled: bool) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::SetDetectableAutoRepeat(enabled))
            .await
    }

    pub async fn copy(&self) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::Copy).await
    }

    pub async fn paste(&self) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::Paste).await
    }

    pub async fn update_input_method_area(&self, region: Vec<Rect>) -> Result<(), BrokerClosed> {
        self.command(BrokerCommand::UpdateInputMethodArea(region))
            .await
    }

    /// Preedit rectangle of the active context; `None` on any failure.
    pub async fn preedit_rectangle(&self) -> Option<Rect> {
        let (tx, rx) = oneshot::channel();
        self.command(BrokerCommand::PreeditRectangle {
            reply: tx,
            events: self.events.clone(),
        })
        .await
        .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn current_active(&self) -> Result<Option<ConnectionId>, BrokerClosed> {
        let (tx, rx) = oneshot::channel();
        self.command(BrokerCommand::CurrentActive(tx)).await?;
        rx.await.map_err(|_| BrokerClosed)
    }

    pub async fn subscribe_widget_state(
        &self,
    ) -> Result<watch::Receiver<Arc<WidgetState>>, BrokerClosed> {
        let (tx, rx) = oneshot::channel();
        self.command(BrokerCommand::SubscribeWidgetState(tx)).await?;
        rx.await.map_err(|_| BrokerClosed)
    }

    /// Asks the broker to stop. Succeeds even if it already has.
    pub async fn shutdown(&self) {
        let _ = self.events.send(BrokerEvent::Shutdown).await;
    }
}
