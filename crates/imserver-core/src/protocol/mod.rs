//! Protocol module containing message types, the binary codec, and the
//! structured-value format carried inside byte-buffer arguments.

pub mod codec;
pub mod messages;
pub mod sequence;
pub mod variant;

pub use codec::{
    decode_body, decode_header, decode_message, encode_message, Envelope, FrameHeader,
    ProtocolError, MAX_PAYLOAD_LEN,
};
pub use messages::*;
pub use sequence::SequenceCounter;
pub use variant::{
    deserialize_map, deserialize_variant, serialize_variant, Variant, VariantError, VariantMap,
};
