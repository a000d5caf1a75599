//! Active-context selection and the global capability flags pushed to it.

use imserver_core::protocol::messages::ContextMessage;

use super::connection_registry::ConnectionId;

/// The one connection whose widget currently owns text focus, if any.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActiveContext {
    current: Option<ConnectionId>,
}

impl ActiveContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn is_active(&self, id: ConnectionId) -> bool {
        self.current == Some(id)
    }

    /// Sets the active connection and returns the previous one.
    pub fn replace(&mut self, next: Option<ConnectionId>) -> Option<ConnectionId> {
        std::mem::replace(&mut self.current, next)
    }

    /// Clears the selection if `id` is active. Returns whether it was.
    pub fn clear_if_active(&mut self, id: ConnectionId) -> bool {
        if self.is_active(id) {
            self.current = None;
            true
        } else {
            false
        }
    }
}

/// Capability flags set by the input method and mirrored to the active
/// connection. All start `false`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GlobalCapabilities {
    pub correction_enabled: bool,
    pub redirect_keys: bool,
    pub detectable_auto_repeat: bool,
}

impl GlobalCapabilities {
    /// Stores the flag; returns `true` if it changed.
    pub fn set_correction_enabled(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.correction_enabled, enabled) != enabled
    }

    /// Stores the flag; returns `true` if it changed.
    pub fn set_redirect_keys(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.redirect_keys, enabled) != enabled
    }

    /// Stores the flag; returns `true` if it changed.
    pub fn set_detectable_auto_repeat(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.detectable_auto_repeat, enabled) != enabled
    }

    /// Calls that bring a newly activated connection up to date, in push order.
    pub fn activation_pushes(&self) -> [ContextMessage; 3] {
        [
            ContextMessage::SetGlobalCorrectionEnabled(self.correction_enabled),
            ContextMessage::SetRedirectKeys(self.redirect_keys),
            ContextMessage::DetectableAutoRepeat(self.detectable_auto_repeat),
        ]
    }
}
