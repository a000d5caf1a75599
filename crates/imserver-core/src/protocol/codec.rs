//! Binary codec for encoding and decoding input-context protocol messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][serial:8][payload:N]
//! ```
//! Total header size: 16 bytes. All multi-byte integers are big-endian.
//! Strings and opaque byte buffers carry a 4-byte length prefix.
//!
//! Stream readers can split decoding in two: [`decode_header`] on the fixed
//! 16 bytes, then [`decode_body`] once the payload has arrived. That lets a
//! reader skip a frame with an unknown type code without losing sync.

use thiserror::Error;

use crate::domain::geometry::{Point, Rect};
use crate::protocol::messages::{
    ContextMessage, KeyEvent, KeyEventType, MessageType, PreeditFace, PreeditRectangle,
    HEADER_SIZE, PROTOCOL_VERSION,
};

/// Largest payload a decoder accepts (16 MiB).
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the actual data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The header announces a payload larger than [`MAX_PAYLOAD_LEN`].
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// A decoded message together with the serial number from its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender-assigned serial. Replies echo the serial of the query they answer.
    pub serial: u64,
    pub message: ContextMessage,
}

/// The fixed 16-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw type byte; validated by [`decode_body`].
    pub msg_type: u8,
    pub payload_len: usize,
    pub serial: u64,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`ContextMessage`] into a byte vector including the 16-byte header.
///
/// The serial is **not** chosen by this function – pass a value from a
/// [`crate::protocol::SequenceCounter`], or the query's serial for a reply.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds
/// [`MAX_PAYLOAD_LEN`].
///
/// # Examples
///
/// ```rust
/// use imserver_core::protocol::{encode_message, decode_message};
/// use imserver_core::protocol::messages::ContextMessage;
///
/// let msg = ContextMessage::SetPreedit { text: "abc".to_string() };
/// let bytes = encode_message(&msg, 7).unwrap();
/// let (envelope, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(envelope.message, msg);
/// assert_eq!(envelope.serial, 7);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &ContextMessage, serial: u64) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg);
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }
    let payload_len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    // Header: version (1) + msg_type (1) + reserved (2) + payload_len (4) +
    //         serial (8) = 16 bytes
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&serial.to_be_bytes());

    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Parses the fixed header at the start of `bytes`.
///
/// Only the version and the payload size are validated here; the type byte
/// is checked later by [`decode_body`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if fewer than 16 bytes are available, the
/// version is unsupported, or the payload is larger than [`MAX_PAYLOAD_LEN`].
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(payload_len));
    }

    let mut serial = [0u8; 8];
    serial.copy_from_slice(&bytes[8..16]);

    Ok(FrameHeader {
        msg_type: bytes[1],
        payload_len,
        serial: u64::from_be_bytes(serial),
    })
}

/// Decodes the payload that follows `header`.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownMessageType`] for an unrecognised type
/// byte, or another [`ProtocolError`] if the payload is malformed.
pub fn decode_body(header: &FrameHeader, payload: &[u8]) -> Result<Envelope, ProtocolError> {
    let msg_type = MessageType::try_from(header.msg_type)
        .map_err(|_| ProtocolError::UnknownMessageType(header.msg_type))?;
    if payload.len() != header.payload_len {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: header.payload_len,
            available: payload.len(),
        });
    }
    let message = decode_payload(msg_type, payload)?;
    Ok(Envelope {
        serial: header.serial,
        message,
    })
}

/// Decodes one message from the beginning of `bytes`.
///
/// Returns the envelope and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(Envelope, usize), ProtocolError> {
    let header = decode_header(bytes)?;

    let total_needed = HEADER_SIZE + header.payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: header.payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let envelope = decode_body(&header, &bytes[HEADER_SIZE..total_needed])?;
    Ok((envelope, total_needed))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &ContextMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        ContextMessage::ActivateContext
        | ContextMessage::ShowInputMethod
        | ContextMessage::HideInputMethod
        | ContextMessage::Reset
        | ContextMessage::ImInitiatedHide
        | ContextMessage::ActivationLostEvent
        | ContextMessage::Copy
        | ContextMessage::Paste
        | ContextMessage::PreeditRectangle => {} // empty payload
        ContextMessage::MouseClickedOnPreedit { pos, preedit_rect } => {
            write_point(&mut buf, pos);
            write_rect(&mut buf, preedit_rect);
        }
        ContextMessage::SetPreedit { text } | ContextMessage::CommitString { text } => {
            write_length_prefixed_string(&mut buf, text);
        }
        ContextMessage::UpdateWidgetInformation {
            state,
            focus_changed,
        } => {
            write_length_prefixed_bytes(&mut buf, state);
            buf.push(u8::from(*focus_changed));
        }
        ContextMessage::AppOrientationChanged { angle } => {
            buf.extend_from_slice(&angle.to_be_bytes());
        }
        ContextMessage::SetCopyPasteState {
            copy_available,
            paste_available,
        } => {
            buf.push(u8::from(*copy_available));
            buf.push(u8::from(*paste_available));
        }
        ContextMessage::ProcessKeyEvent {
            event,
            native_scan_code,
            native_modifiers,
        } => {
            encode_key_event(&mut buf, event);
            buf.extend_from_slice(&native_scan_code.to_be_bytes());
            buf.extend_from_slice(&native_modifiers.to_be_bytes());
        }
        ContextMessage::RegisterToolbar {
            id,
            descriptor_path,
        } => {
            buf.extend_from_slice(&id.to_be_bytes());
            write_length_prefixed_string(&mut buf, descriptor_path);
        }
        ContextMessage::UnregisterToolbar { id } => buf.extend_from_slice(&id.to_be_bytes()),
        ContextMessage::SetToolbarItemAttribute {
            id,
            item,
            attribute,
            value,
        } => {
            buf.extend_from_slice(&id.to_be_bytes());
            write_length_prefixed_string(&mut buf, item);
            write_length_prefixed_string(&mut buf, attribute);
            write_length_prefixed_bytes(&mut buf, value);
        }
        ContextMessage::PreeditRectangleReply(reply) => {
            buf.push(u8::from(reply.valid));
            write_rect(&mut buf, &reply.rect);
        }
        ContextMessage::UpdatePreedit { text, face } => {
            write_length_prefixed_string(&mut buf, text);
            buf.push(*face as u8);
        }
        ContextMessage::KeyEvent(event) => encode_key_event(&mut buf, event),
        ContextMessage::SetGlobalCorrectionEnabled(flag)
        | ContextMessage::SetRedirectKeys(flag)
        | ContextMessage::DetectableAutoRepeat(flag) => buf.push(u8::from(*flag)),
        ContextMessage::UpdateInputMethodArea { region } => {
            write_length_prefixed_bytes(&mut buf, region);
        }
    }
    buf
}

fn encode_key_event(buf: &mut Vec<u8>, event: &KeyEvent) {
    buf.push(event.event_type as u8);
    buf.extend_from_slice(&event.key_code.to_be_bytes());
    buf.extend_from_slice(&event.modifiers.to_be_bytes());
    write_length_prefixed_string(buf, &event.text);
    buf.push(u8::from(event.auto_repeat));
    buf.extend_from_slice(&event.count.to_be_bytes());
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<ContextMessage, ProtocolError> {
    let mut r = PayloadReader::new(payload);
    let msg = match msg_type {
        MessageType::ActivateContext => ContextMessage::ActivateContext,
        MessageType::ShowInputMethod => ContextMessage::ShowInputMethod,
        MessageType::HideInputMethod => ContextMessage::HideInputMethod,
        MessageType::Reset => ContextMessage::Reset,
        MessageType::ImInitiatedHide => ContextMessage::ImInitiatedHide,
        MessageType::ActivationLostEvent => ContextMessage::ActivationLostEvent,
        MessageType::Copy => ContextMessage::Copy,
        MessageType::Paste => ContextMessage::Paste,
        MessageType::PreeditRectangle => ContextMessage::PreeditRectangle,
        MessageType::MouseClickedOnPreedit => ContextMessage::MouseClickedOnPreedit {
            pos: r.point()?,
            preedit_rect: r.rect()?,
        },
        MessageType::SetPreedit => ContextMessage::SetPreedit { text: r.string()? },
        MessageType::CommitString => ContextMessage::CommitString { text: r.string()? },
        MessageType::UpdateWidgetInformation => ContextMessage::UpdateWidgetInformation {
            state: r.bytes()?,
            focus_changed: r.bool()?,
        },
        MessageType::AppOrientationChanged => ContextMessage::AppOrientationChanged {
            angle: r.i32()?,
        },
        MessageType::SetCopyPasteState => ContextMessage::SetCopyPasteState {
            copy_available: r.bool()?,
            paste_available: r.bool()?,
        },
        MessageType::ProcessKeyEvent => ContextMessage::ProcessKeyEvent {
            event: decode_key_event(&mut r)?,
            native_scan_code: r.u32()?,
            native_modifiers: r.u32()?,
        },
        MessageType::RegisterToolbar => ContextMessage::RegisterToolbar {
            id: r.i32()?,
            descriptor_path: r.string()?,
        },
        MessageType::UnregisterToolbar => ContextMessage::UnregisterToolbar { id: r.i32()? },
        MessageType::SetToolbarItemAttribute => ContextMessage::SetToolbarItemAttribute {
            id: r.i32()?,
            item: r.string()?,
            attribute: r.string()?,
            value: r.bytes()?,
        },
        MessageType::PreeditRectangleReply => {
            ContextMessage::PreeditRectangleReply(PreeditRectangle {
                valid: r.bool()?,
                rect: r.rect()?,
            })
        }
        MessageType::UpdatePreedit => {
            let text = r.string()?;
            let face_byte = r.u8()?;
            let face = PreeditFace::try_from(face_byte).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown preedit face 0x{face_byte:02X}"))
            })?;
            ContextMessage::UpdatePreedit { text, face }
        }
        MessageType::KeyEvent => ContextMessage::KeyEvent(decode_key_event(&mut r)?),
        MessageType::SetGlobalCorrectionEnabled => {
            ContextMessage::SetGlobalCorrectionEnabled(r.bool()?)
        }
        MessageType::SetRedirectKeys => ContextMessage::SetRedirectKeys(r.bool()?),
        MessageType::DetectableAutoRepeat => ContextMessage::DetectableAutoRepeat(r.bool()?),
        MessageType::UpdateInputMethodArea => {
            ContextMessage::UpdateInputMethodArea { region: r.bytes()? }
        }
    };
    r.finish()?;
    Ok(msg)
}

fn decode_key_event(r: &mut PayloadReader<'_>) -> Result<KeyEvent, ProtocolError> {
    let type_byte = r.u8()?;
    let event_type = KeyEventType::try_from(type_byte).map_err(|_| {
        ProtocolError::MalformedPayload(format!("unknown key event type {type_byte}"))
    })?;
    Ok(KeyEvent {
        event_type,
        key_code: r.i32()?,
        modifiers: r.u32()?,
        text: r.string()?,
        auto_repeat: r.bool()?,
        count: r.i32()?,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn write_point(buf: &mut Vec<u8>, p: &Point) {
    buf.extend_from_slice(&p.x.to_be_bytes());
    buf.extend_from_slice(&p.y.to_be_bytes());
}

fn write_rect(buf: &mut Vec<u8>, r: &Rect) {
    buf.extend_from_slice(&r.x.to_be_bytes());
    buf.extend_from_slice(&r.y.to_be_bytes());
    buf.extend_from_slice(&r.width.to_be_bytes());
    buf.extend_from_slice(&r.height.to_be_bytes());
}

/// Writes a 4-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    write_length_prefixed_bytes(buf, s.as_bytes());
}

/// Writes a 4-byte length prefix followed by the raw bytes.
fn write_length_prefixed_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Forward-only reader over a payload slice.
struct PayloadReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn take(&mut self, len: usize, context: &str) -> Result<&'a [u8], ProtocolError> {
        let end = self.offset.checked_add(len).ok_or_else(|| {
            ProtocolError::MalformedPayload(format!("{context}: length {len} overflows"))
        })?;
        if self.buf.len() < end {
            return Err(ProtocolError::MalformedPayload(format!(
                "{context}: need {len} bytes at offset {}, got {}",
                self.offset,
                self.buf.len().saturating_sub(self.offset)
            )));
        }
        let slice = &self.buf[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1, "u8")?[0])
    }

    fn bool(&mut self) -> Result<bool, ProtocolError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::MalformedPayload(format!(
                "invalid bool byte {other}"
            ))),
        }
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4, "u32")?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4, "i32")?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn point(&mut self) -> Result<Point, ProtocolError> {
        Ok(Point::new(self.i32()?, self.i32()?))
    }

    fn rect(&mut self) -> Result<Rect, ProtocolError> {
        Ok(Rect::new(self.i32()?, self.i32()?, self.i32()?, self.i32()?))
    }

    fn bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.u32()? as usize;
        Ok(self.take(len, "byte buffer")?.to_vec())
    }

    fn string(&mut self) -> Result<String, ProtocolError> {
        let len = self.u32()? as usize;
        let raw = self.take(len, "string")?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))
    }

    /// Fails if bytes remain after the last field.
    fn finish(&self) -> Result<(), ProtocolError> {
        if self.offset == self.buf.len() {
            Ok(())
        } else {
            Err(ProtocolError::MalformedPayload(format!(
                "{} trailing bytes",
                self.buf.len() - self.offset
            )))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &ContextMessage) -> ContextMessage {
        let encoded = encode_message(msg, 3).expect("encode failed");
        let (envelope, consumed) = decode_message(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed bytes should equal total encoded size");
        assert_eq!(envelope.serial, 3);
        envelope.message
    }

    fn sample_key_event() -> KeyEvent {
        KeyEvent {
            event_type: KeyEventType::KeyRelease,
            key_code: 0x0100_0004,
            modifiers: 0x0200_0000,
            text: "\r".to_string(),
            auto_repeat: true,
            count: 2,
        }
    }

    // ── Header ────────────────────────────────────────────────────────────────

    #[test]
    fn test_header_layout_is_big_endian() {
        // Arrange
        let msg = ContextMessage::AppOrientationChanged { angle: 90 };

        // Act
        let bytes = encode_message(&msg, 0x0102_0304_0506_0708).unwrap();

        // Assert
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(bytes[1], MessageType::AppOrientationChanged as u8);
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(&bytes[4..8], &4u32.to_be_bytes());
        assert_eq!(&bytes[8..16], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[16..], &90i32.to_be_bytes());
    }

    #[test]
    fn test_empty_payload_messages_are_header_only() {
        for msg in [
            ContextMessage::ActivateContext,
            ContextMessage::Reset,
            ContextMessage::ActivationLostEvent,
            ContextMessage::PreeditRectangle,
        ] {
            let bytes = encode_message(&msg, 0).unwrap();
            assert_eq!(bytes.len(), HEADER_SIZE);
            assert_eq!(round_trip(&msg), msg);
        }
    }

    // ── Payload round trips ───────────────────────────────────────────────────

    #[test]
    fn test_update_widget_information_keeps_opaque_state() {
        let msg = ContextMessage::UpdateWidgetInformation {
            state: vec![0xDE, 0xAD, 0xBE, 0xEF],
            focus_changed: true,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_process_key_event_round_trip() {
        let msg = ContextMessage::ProcessKeyEvent {
            event: sample_key_event(),
            native_scan_code: 36,
            native_modifiers: 0x10,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_set_toolbar_item_attribute_round_trip() {
        let msg = ContextMessage::SetToolbarItemAttribute {
            id: 4,
            item: "send".to_string(),
            attribute: "enabled".to_string(),
            value: vec![1, 2, 3],
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_update_preedit_round_trip_with_unicode_text() {
        let msg = ContextMessage::UpdatePreedit {
            text: "こんにちは".to_string(),
            face: PreeditFace::Unconvertible,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_mouse_clicked_on_preedit_round_trip_with_negative_coordinates() {
        let msg = ContextMessage::MouseClickedOnPreedit {
            pos: Point::new(-5, 12),
            preedit_rect: Rect::new(-10, 0, 200, 30),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_preedit_rectangle_reply_round_trip() {
        let msg = ContextMessage::PreeditRectangleReply(PreeditRectangle {
            valid: true,
            rect: Rect::new(1, 2, 3, 4),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    // ── Error paths ───────────────────────────────────────────────────────────

    #[test]
    fn test_decode_short_header_is_insufficient_data() {
        let result = decode_message(&[PROTOCOL_VERSION, 0x01]);
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData {
                needed: HEADER_SIZE,
                available: 2
            })
        );
    }

    #[test]
    fn test_decode_wrong_version_is_rejected() {
        let mut bytes = encode_message(&ContextMessage::Copy, 0).unwrap();
        bytes[0] = 0x7F;
        assert_eq!(decode_message(&bytes), Err(ProtocolError::UnsupportedVersion(0x7F)));
    }

    #[test]
    fn test_decode_unknown_type_is_rejected_after_header() {
        // Arrange
        let mut bytes = encode_message(&ContextMessage::Copy, 0).unwrap();
        bytes[1] = 0x3F;

        // Act
        let header = decode_header(&bytes).expect("header itself is valid");
        let body = decode_body(&header, &[]);

        // Assert
        assert_eq!(header.msg_type, 0x3F);
        assert_eq!(body, Err(ProtocolError::UnknownMessageType(0x3F)));
    }

    #[test]
    fn test_decode_truncated_payload_reports_mismatch() {
        let bytes = encode_message(&ContextMessage::SetPreedit { text: "abc".into() }, 0).unwrap();
        let truncated = &bytes[..bytes.len() - 1];
        assert!(matches!(
            decode_message(truncated),
            Err(ProtocolError::PayloadLengthMismatch { declared: 7, available: 6 })
        ));
    }

    #[test]
    fn test_decode_oversized_declared_payload_is_rejected() {
        let mut bytes = encode_message(&ContextMessage::Copy, 0).unwrap();
        bytes[4..8].copy_from_slice(&(MAX_PAYLOAD_LEN as u32 + 1).to_be_bytes());
        assert_eq!(
            decode_header(&bytes),
            Err(ProtocolError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn test_decode_invalid_bool_is_malformed() {
        let mut bytes = encode_message(&ContextMessage::SetRedirectKeys(true), 0).unwrap();
        bytes[HEADER_SIZE] = 2;
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_trailing_bytes_are_malformed() {
        let mut bytes = encode_message(&ContextMessage::Paste, 0).unwrap();
        bytes[4..8].copy_from_slice(&1u32.to_be_bytes());
        bytes.push(0);
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_invalid_utf8_is_malformed() {
        let mut bytes = encode_message(&ContextMessage::CommitString { text: "ab".into() }, 0)
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0xFF;
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_consumes_only_first_frame() {
        // Arrange – two frames back to back
        let mut bytes = encode_message(&ContextMessage::ShowInputMethod, 1).unwrap();
        let first_len = bytes.len();
        bytes.extend(encode_message(&ContextMessage::HideInputMethod, 2).unwrap());

        // Act
        let (first, consumed) = decode_message(&bytes).unwrap();
        let (second, _) = decode_message(&bytes[consumed..]).unwrap();

        // Assert
        assert_eq!(consumed, first_len);
        assert_eq!(first.message, ContextMessage::ShowInputMethod);
        assert_eq!(second.message, ContextMessage::HideInputMethod);
        assert_eq!(second.serial, 2);
    }
}
