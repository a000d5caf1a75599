//! All input-context protocol message types.
//!
//! One enum, [`ContextMessage`], covers both directions: calls an input
//! context makes on the server (activation, widget state pushes, toolbar
//! registration, ...) and calls the server makes on the active input context
//! (preedit, commit, key replay, capability toggles, ...).

use crate::domain::geometry::{Point, Rect};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common frame header in bytes.
pub const HEADER_SIZE: usize = 16;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes understood on the input-context socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    // Input context → server (0x01–0x3F)
    ActivateContext = 0x01,
    ShowInputMethod = 0x02,
    HideInputMethod = 0x03,
    MouseClickedOnPreedit = 0x04,
    SetPreedit = 0x05,
    UpdateWidgetInformation = 0x06,
    Reset = 0x07,
    AppOrientationChanged = 0x08,
    SetCopyPasteState = 0x09,
    ProcessKeyEvent = 0x0A,
    RegisterToolbar = 0x0B,
    UnregisterToolbar = 0x0C,
    SetToolbarItemAttribute = 0x0D,
    PreeditRectangleReply = 0x0E,
    // Server → input context (0x40–0x7F)
    UpdatePreedit = 0x40,
    CommitString = 0x41,
    KeyEvent = 0x42,
    ImInitiatedHide = 0x43,
    SetGlobalCorrectionEnabled = 0x44,
    SetRedirectKeys = 0x45,
    DetectableAutoRepeat = 0x46,
    ActivationLostEvent = 0x47,
    Copy = 0x48,
    Paste = 0x49,
    UpdateInputMethodArea = 0x4A,
    PreeditRectangle = 0x4B,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::ActivateContext),
            0x02 => Ok(MessageType::ShowInputMethod),
            0x03 => Ok(MessageType::HideInputMethod),
            0x04 => Ok(MessageType::MouseClickedOnPreedit),
            0x05 => Ok(MessageType::SetPreedit),
            0x06 => Ok(MessageType::UpdateWidgetInformation),
            0x07 => Ok(MessageType::Reset),
            0x08 => Ok(MessageType::AppOrientationChanged),
            0x09 => Ok(MessageType::SetCopyPasteState),
            0x0A => Ok(MessageType::ProcessKeyEvent),
            0x0B => Ok(MessageType::RegisterToolbar),
            0x0C => Ok(MessageType::UnregisterToolbar),
            0x0D => Ok(MessageType::SetToolbarItemAttribute),
            0x0E => Ok(MessageType::PreeditRectangleReply),
            0x40 => Ok(MessageType::UpdatePreedit),
            0x41 => Ok(MessageType::CommitString),
            0x42 => Ok(MessageType::KeyEvent),
            0x43 => Ok(MessageType::ImInitiatedHide),
            0x44 => Ok(MessageType::SetGlobalCorrectionEnabled),
            0x45 => Ok(MessageType::SetRedirectKeys),
            0x46 => Ok(MessageType::DetectableAutoRepeat),
            0x47 => Ok(MessageType::ActivationLostEvent),
            0x48 => Ok(MessageType::Copy),
            0x49 => Ok(MessageType::Paste),
            0x4A => Ok(MessageType::UpdateInputMethodArea),
            0x4B => Ok(MessageType::PreeditRectangle),
            _ => Err(()),
        }
    }
}

/// Which side of the socket originates a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by an input context, handled by the server.
    ToServer,
    /// Sent by the server to the active input context.
    ToContext,
}

// ── Payload value types ───────────────────────────────────────────────────────

/// Key event kind, using the toolkit's event type numbers on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyEventType {
    KeyPress = 0x06,
    KeyRelease = 0x07,
}

impl TryFrom<u8> for KeyEventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x06 => Ok(KeyEventType::KeyPress),
            0x07 => Ok(KeyEventType::KeyRelease),
            _ => Err(()),
        }
    }
}

/// Visual style the input context should use for preedit text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PreeditFace {
    #[default]
    Default = 0x00,
    NoCandidates = 0x01,
    KeyPress = 0x02,
    Unconvertible = 0x03,
    Active = 0x04,
}

impl TryFrom<u8> for PreeditFace {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(PreeditFace::Default),
            0x01 => Ok(PreeditFace::NoCandidates),
            0x02 => Ok(PreeditFace::KeyPress),
            0x03 => Ok(PreeditFace::Unconvertible),
            0x04 => Ok(PreeditFace::Active),
            _ => Err(()),
        }
    }
}

/// A key event as exchanged between input contexts and the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub event_type: KeyEventType,
    /// Toolkit key code.
    pub key_code: i32,
    /// Toolkit keyboard modifier bit mask.
    pub modifiers: u32,
    pub text: String,
    pub auto_repeat: bool,
    pub count: i32,
}

/// Reply to a [`ContextMessage::PreeditRectangle`] query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreeditRectangle {
    /// `false` when the input context has no preedit on screen.
    pub valid: bool,
    pub rect: Rect,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// Every call that can travel over an input-context connection.
///
/// Byte-buffer fields (`state`, `value`, `region`) hold a serialized
/// [`crate::Variant`]; they are decoded by the receiver, not by the codec, so
/// that a malformed structured argument only drops that single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextMessage {
    // ── Input context → server ────────────────────────────────────────────
    ActivateContext,
    ShowInputMethod,
    HideInputMethod,
    MouseClickedOnPreedit {
        pos: Point,
        preedit_rect: Rect,
    },
    SetPreedit {
        text: String,
    },
    UpdateWidgetInformation {
        state: Vec<u8>,
        focus_changed: bool,
    },
    Reset,
    AppOrientationChanged {
        angle: i32,
    },
    SetCopyPasteState {
        copy_available: bool,
        paste_available: bool,
    },
    ProcessKeyEvent {
        event: KeyEvent,
        native_scan_code: u32,
        native_modifiers: u32,
    },
    RegisterToolbar {
        id: i32,
        descriptor_path: String,
    },
    UnregisterToolbar {
        id: i32,
    },
    SetToolbarItemAttribute {
        id: i32,
        item: String,
        attribute: String,
        value: Vec<u8>,
    },
    PreeditRectangleReply(PreeditRectangle),

    // ── Server → input context ────────────────────────────────────────────
    UpdatePreedit {
        text: String,
        face: PreeditFace,
    },
    CommitString {
        text: String,
    },
    KeyEvent(KeyEvent),
    ImInitiatedHide,
    SetGlobalCorrectionEnabled(bool),
    SetRedirectKeys(bool),
    DetectableAutoRepeat(bool),
    ActivationLostEvent,
    Copy,
    Paste,
    UpdateInputMethodArea {
        region: Vec<u8>,
    },
    PreeditRectangle,
}

impl ContextMessage {
    /// Returns the wire type code for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            ContextMessage::ActivateContext => MessageType::ActivateContext,
            ContextMessage::ShowInputMethod => MessageType::ShowInputMethod,
            ContextMessage::HideInputMethod => MessageType::HideInputMethod,
            ContextMessage::MouseClickedOnPreedit { .. } => MessageType::MouseClickedOnPreedit,
            ContextMessage::SetPreedit { .. } => MessageType::SetPreedit,
            ContextMessage::UpdateWidgetInformation { .. } => MessageType::UpdateWidgetInformation,
            ContextMessage::Reset => MessageType::Reset,
            ContextMessage::AppOrientationChanged { .. } => MessageType::AppOrientationChanged,
            ContextMessage::SetCopyPasteState { .. } => MessageType::SetCopyPasteState,
            ContextMessage::ProcessKeyEvent { .. } => MessageType::ProcessKeyEvent,
            ContextMessage::RegisterToolbar { .. } => MessageType::RegisterToolbar,
            ContextMessage::UnregisterToolbar { .. } => MessageType::UnregisterToolbar,
            ContextMessage::SetToolbarItemAttribute { .. } => MessageType::SetToolbarItemAttribute,
            ContextMessage::PreeditRectangleReply(_) => MessageType::PreeditRectangleReply,
            ContextMessage::UpdatePreedit { .. } => MessageType::UpdatePreedit,
            ContextMessage::CommitString { .. } => MessageType::CommitString,
            ContextMessage::KeyEvent(_) => MessageType::KeyEvent,
            ContextMessage::ImInitiatedHide => MessageType::ImInitiatedHide,
            ContextMessage::SetGlobalCorrectionEnabled(_) => MessageType::SetGlobalCorrectionEnabled,
            ContextMessage::SetRedirectKeys(_) => MessageType::SetRedirectKeys,
            ContextMessage::DetectableAutoRepeat(_) => MessageType::DetectableAutoRepeat,
            ContextMessage::ActivationLostEvent => MessageType::ActivationLostEvent,
            ContextMessage::Copy => MessageType::Copy,
            ContextMessage::Paste => MessageType::Paste,
            ContextMessage::UpdateInputMethodArea { .. } => MessageType::UpdateInputMethodArea,
            ContextMessage::PreeditRectangle => MessageType::PreeditRectangle,
        }
    }

    /// Returns which side is allowed to originate this message.
    pub fn direction(&self) -> Direction {
        if (self.message_type() as u8) < 0x40 {
            Direction::ToServer
        } else {
            Direction::ToContext
        }
    }
}
