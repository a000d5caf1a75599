//! # imserver-core
//!
//! Shared library for the input-method server containing the input-context
//! wire protocol, the opaque structured-value format, and the widget and
//! toolbar domain types.
//!
//! This crate is used by the server and by client-side input-context
//! implementations. It has no dependencies on sockets, buses, or UI toolkits.
//!
//! # Architecture overview
//!
//! Every text-entry widget in a client application owns an *input context*.
//! The input context opens a private socket to the input-method server and
//! exchanges small RPC-like calls with it: the widget pushes its state
//! (focus, surrounding text, toolbar, ...) and the server pushes back preedit
//! text, commits and key events.
//!
//! - **`protocol`** – How calls travel over the socket. Each call is framed
//!   as a 16-byte header plus a payload and decoded back into a typed
//!   [`ContextMessage`] on the other end. Structured arguments (widget state
//!   maps, toolbar attribute values, regions) travel as opaque byte buffers
//!   holding a serialized [`Variant`].
//!
//! - **`domain`** – Pure types with no I/O: geometry, the global toolbar id,
//!   and the widget state snapshot with its typed accessors.

pub mod domain;
pub mod protocol;

pub use domain::geometry::{Point, Rect};
pub use domain::toolbar::{ToolbarData, ToolbarId};
pub use domain::widget_state::{WidgetAttribute, WidgetState};
pub use protocol::codec::{decode_message, encode_message, Envelope, ProtocolError};
pub use protocol::messages::ContextMessage;
pub use protocol::variant::{Variant, VariantError, VariantMap};
