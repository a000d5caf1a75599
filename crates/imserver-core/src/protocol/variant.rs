//! Structured values carried inside opaque byte-buffer arguments.
//!
//! A few calls carry arguments whose shape is not fixed by the message type:
//! the widget state map of `UpdateWidgetInformation`, the attribute value of
//! `SetToolbarItemAttribute`, and the region of `UpdateInputMethodArea`.
//! These travel as a [`Variant`] serialized with `bincode`. The codec leaves
//! them as raw bytes; the receiver deserializes them, so a broken buffer only
//! costs the single call it arrived with.
//!
//! Conversions are lenient in the usual toolkit way: an integer can be read
//! as a bool, a numeric string can be read as an integer, and so on.
//!
//! Buffers come straight from clients, so decoding is bounded twice: no
//! declared length may exceed the buffer itself, and lists and maps may nest
//! at most [`MAX_VARIANT_DEPTH`] levels deep.

use std::collections::BTreeMap;
use std::fmt;

use bincode::Options;
use serde::de::{self, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::domain::geometry::{Point, Rect};

/// String-keyed map of variants.
pub type VariantMap = BTreeMap<String, Variant>;

/// Deepest list or map nesting accepted when decoding a buffer.
pub const MAX_VARIANT_DEPTH: usize = 32;

/// Preallocation cap for lists and maps; the declared length is untrusted.
const MAX_PREALLOCATED: usize = 1024;

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Variant {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Point(Point),
    Rect(Rect),
    List(Vec<Variant>),
    Map(VariantMap),
}

/// Errors produced while turning byte buffers back into variants.
#[derive(Debug, Error)]
pub enum VariantError {
    /// The buffer is not a valid serialized [`Variant`].
    #[error("cannot decode variant: {0}")]
    Decode(#[source] bincode::Error),

    /// The value could not be serialized.
    #[error("cannot encode variant: {0}")]
    Encode(#[source] bincode::Error),

    /// The buffer decoded, but not to the expected kind of value.
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl Variant {
    /// Short name of the variant kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::UInt(_) => "uint",
            Variant::Double(_) => "double",
            Variant::String(_) => "string",
            Variant::Point(_) => "point",
            Variant::Rect(_) => "rect",
            Variant::List(_) => "list",
            Variant::Map(_) => "map",
        }
    }

    /// Reads the value as a bool.
    ///
    /// Numbers are `true` when non-zero; strings are `false` when empty,
    /// `"0"` or `"false"` (any case) and `true` otherwise.
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            Variant::Int(n) => Some(*n != 0),
            Variant::UInt(n) => Some(*n != 0),
            Variant::Double(d) => Some(*d != 0.0),
            Variant::String(s) => {
                let s = s.trim();
                Some(!(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")))
            }
            _ => None,
        }
    }

    /// Reads the value as a signed integer. Doubles are rounded.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Variant::Bool(b) => Some(i64::from(*b)),
            Variant::Int(n) => Some(*n),
            Variant::UInt(n) => i64::try_from(*n).ok(),
            Variant::Double(d) if d.is_finite() => Some(d.round() as i64),
            Variant::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Reads the value as a string. Scalars are formatted.
    pub fn to_string_value(&self) -> Option<String> {
        match self {
            Variant::String(s) => Some(s.clone()),
            Variant::Bool(b) => Some(b.to_string()),
            Variant::Int(n) => Some(n.to_string()),
            Variant::UInt(n) => Some(n.to_string()),
            Variant::Double(d) => Some(d.to_string()),
            _ => None,
        }
    }

    pub fn to_rect(&self) -> Option<Rect> {
        match self {
            Variant::Rect(r) => Some(*r),
            _ => None,
        }
    }

    pub fn to_point(&self) -> Option<Point> {
        match self {
            Variant::Point(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Variant]> {
        match self {
            Variant::List(items) => Some(items),
            _ => None,
        }
    }

    /// Consumes the value and returns the map inside, if it is one.
    pub fn into_map(self) -> Result<VariantMap, VariantError> {
        match self {
            Variant::Map(map) => Ok(map),
            other => Err(VariantError::TypeMismatch {
                expected: "map",
                found: other.kind(),
            }),
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(i64::from(value))
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<Rect> for Variant {
    fn from(value: Rect) -> Self {
        Variant::Rect(value)
    }
}

impl From<VariantMap> for Variant {
    fn from(value: VariantMap) -> Self {
        Variant::Map(value)
    }
}

// ── Bounded decoding ──────────────────────────────────────────────────────────

const VARIANT_NAMES: &[&str] = &[
    "Bool", "Int", "UInt", "Double", "String", "Point", "Rect", "List", "Map",
];

/// Variant tag; the order matches the declaration order of [`Variant`].
enum Tag {
    Bool,
    Int,
    UInt,
    Double,
    String,
    Point,
    Rect,
    List,
    Map,
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl<'de> Visitor<'de> for TagVisitor {
            type Value = Tag;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a variant tag")
            }

            fn visit_u64<E: de::Error>(self, index: u64) -> Result<Tag, E> {
                Ok(match index {
                    0 => Tag::Bool,
                    1 => Tag::Int,
                    2 => Tag::UInt,
                    3 => Tag::Double,
                    4 => Tag::String,
                    5 => Tag::Point,
                    6 => Tag::Rect,
                    7 => Tag::List,
                    8 => Tag::Map,
                    other => {
                        return Err(E::invalid_value(
                            de::Unexpected::Unsigned(other),
                            &"variant tag 0 to 8",
                        ))
                    }
                })
            }

            fn visit_str<E: de::Error>(self, name: &str) -> Result<Tag, E> {
                match VARIANT_NAMES.iter().position(|n| *n == name) {
                    Some(index) => self.visit_u64(index as u64),
                    None => Err(E::unknown_variant(name, VARIANT_NAMES)),
                }
            }
        }

        deserializer.deserialize_identifier(TagVisitor)
    }
}

/// Decodes one [`Variant`] found `depth` containers below the top.
#[derive(Clone, Copy)]
struct VariantSeed {
    depth: usize,
}

impl VariantSeed {
    fn child<E: de::Error>(self) -> Result<Self, E> {
        let depth = self.depth + 1;
        if depth > MAX_VARIANT_DEPTH {
            return Err(E::custom(format_args!(
                "variant nesting exceeds {MAX_VARIANT_DEPTH} levels"
            )));
        }
        Ok(Self { depth })
    }
}

impl<'de> DeserializeSeed<'de> for VariantSeed {
    type Value = Variant;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Variant, D::Error> {
        deserializer.deserialize_enum("Variant", VARIANT_NAMES, self)
    }
}

impl<'de> Visitor<'de> for VariantSeed {
    type Value = Variant;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a variant")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Variant, A::Error> {
        let (tag, value) = data.variant::<Tag>()?;
        Ok(match tag {
            Tag::Bool => Variant::Bool(value.newtype_variant()?),
            Tag::Int => Variant::Int(value.newtype_variant()?),
            Tag::UInt => Variant::UInt(value.newtype_variant()?),
            Tag::Double => Variant::Double(value.newtype_variant()?),
            Tag::String => Variant::String(value.newtype_variant()?),
            Tag::Point => Variant::Point(value.newtype_variant()?),
            Tag::Rect => Variant::Rect(value.newtype_variant()?),
            Tag::List => {
                let inner = self.child::<A::Error>()?;
                Variant::List(value.newtype_variant_seed(ListSeed(inner))?)
            }
            Tag::Map => {
                let inner = self.child::<A::Error>()?;
                Variant::Map(value.newtype_variant_seed(MapSeed(inner))?)
            }
        })
    }
}

/// Elements of a list, each decoded with the inner seed.
struct ListSeed(VariantSeed);

impl<'de> DeserializeSeed<'de> for ListSeed {
    type Value = Vec<Variant>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ListSeed {
    type Value = Vec<Variant>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a list of variants")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(MAX_PREALLOCATED));
        while let Some(item) = seq.next_element_seed(self.0)? {
            items.push(item);
        }
        Ok(items)
    }
}

/// Entries of a string-keyed map, values decoded with the inner seed.
struct MapSeed(VariantSeed);

impl<'de> DeserializeSeed<'de> for MapSeed {
    type Value = VariantMap;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for MapSeed {
    type Value = VariantMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of variants")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = VariantMap::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(self.0)?;
            entries.insert(key, value);
        }
        Ok(entries)
    }
}

impl<'de> Deserialize<'de> for Variant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        VariantSeed { depth: 0 }.deserialize(deserializer)
    }
}

// ── Byte-buffer helpers ───────────────────────────────────────────────────────

/// bincode settings of the buffer format.
fn buffer_format() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Serializes a variant into the byte-buffer format.
///
/// # Errors
///
/// Returns [`VariantError::Encode`] if bincode fails.
pub fn serialize_variant(value: &Variant) -> Result<Vec<u8>, VariantError> {
    buffer_format()
        .serialize(value)
        .map_err(VariantError::Encode)
}

/// Deserializes a byte buffer back into a variant.
///
/// # Errors
///
/// Returns [`VariantError::Decode`] for truncated or corrupt buffers, for
/// lengths that point past the end of the buffer, and for values nested
/// deeper than [`MAX_VARIANT_DEPTH`].
pub fn deserialize_variant(bytes: &[u8]) -> Result<Variant, VariantError> {
    buffer_format()
        .with_limit(bytes.len() as u64)
        .deserialize(bytes)
        .map_err(VariantError::Decode)
}

/// Deserializes a byte buffer that must hold a [`Variant::Map`].
///
/// # Errors
///
/// Returns [`VariantError::Decode`] for corrupt buffers and
/// [`VariantError::TypeMismatch`] when the value is not a map.
pub fn deserialize_map(bytes: &[u8]) -> Result<VariantMap, VariantError> {
    deserialize_variant(bytes)?.into_map()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_map_survives_byte_buffer() {
        // Arrange
        let mut inner = VariantMap::new();
        inner.insert("cursor".into(), Variant::Int(3));
        let mut map = VariantMap::new();
        map.insert("area".into(), Variant::List(vec![Rect::new(0, 0, 10, 20).into()]));
        map.insert("inner".into(), Variant::Map(inner));
        map.insert("ratio".into(), Variant::Double(0.5));
        let value = Variant::Map(map);

        // Act
        let bytes = serialize_variant(&value).unwrap();
        let decoded = deserialize_variant(&bytes).unwrap();

        // Assert
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = deserialize_variant(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
        assert!(matches!(result, Err(VariantError::Decode(_))));
    }

    #[test]
    fn test_empty_buffer_fails_to_decode() {
        assert!(matches!(deserialize_variant(&[]), Err(VariantError::Decode(_))));
    }

    #[test]
    fn test_deserialize_map_rejects_non_map() {
        // Arrange
        let bytes = serialize_variant(&Variant::Bool(true)).unwrap();

        // Act
        let result = deserialize_map(&bytes);

        // Assert
        assert!(matches!(
            result,
            Err(VariantError::TypeMismatch { expected: "map", found: "bool" })
        ));
    }

    fn nested_lists(levels: usize) -> Variant {
        (0..levels).fold(Variant::Int(1), |inner, _| Variant::List(vec![inner]))
    }

    #[test]
    fn test_nesting_up_to_the_limit_decodes() {
        // Arrange
        let value = nested_lists(MAX_VARIANT_DEPTH);
        let bytes = serialize_variant(&value).unwrap();

        // Act
        let decoded = deserialize_variant(&bytes).unwrap();

        // Assert
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_nesting_beyond_the_limit_is_rejected() {
        let bytes = serialize_variant(&nested_lists(MAX_VARIANT_DEPTH + 1)).unwrap();

        assert!(matches!(deserialize_variant(&bytes), Err(VariantError::Decode(_))));
    }

    #[test]
    fn test_deeply_nested_client_buffer_fails_without_overflowing_the_stack() {
        // Arrange: 200 000 single-element lists opening one inside the other
        let mut bytes = Vec::new();
        for _ in 0..200_000 {
            bytes.extend_from_slice(&7u32.to_le_bytes());
            bytes.extend_from_slice(&1u64.to_le_bytes());
        }
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.push(1);

        // Act
        let result = deserialize_map(&bytes);

        // Assert
        assert!(matches!(result, Err(VariantError::Decode(_))));
    }

    #[test]
    fn test_huge_declared_list_length_is_rejected() {
        let mut bytes = 7u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());

        assert!(matches!(deserialize_variant(&bytes), Err(VariantError::Decode(_))));
    }

    #[test]
    fn test_huge_declared_string_length_is_rejected() {
        let mut bytes = 4u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(1u64 << 40).to_le_bytes());
        bytes.extend_from_slice(b"abc");

        assert!(matches!(deserialize_variant(&bytes), Err(VariantError::Decode(_))));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut bytes = 9u32.to_le_bytes().to_vec();
        bytes.push(0);

        assert!(matches!(deserialize_variant(&bytes), Err(VariantError::Decode(_))));
    }

    #[test]
    fn test_lenient_bool_conversion() {
        assert_eq!(Variant::Int(2).to_bool(), Some(true));
        assert_eq!(Variant::UInt(0).to_bool(), Some(false));
        assert_eq!(Variant::from("false").to_bool(), Some(false));
        assert_eq!(Variant::from("yes").to_bool(), Some(true));
        assert_eq!(Variant::from("").to_bool(), Some(false));
        assert_eq!(Variant::Rect(Rect::default()).to_bool(), None);
    }

    #[test]
    fn test_lenient_int_conversion() {
        assert_eq!(Variant::from(" 42 ").to_int(), Some(42));
        assert_eq!(Variant::Double(2.6).to_int(), Some(3));
        assert_eq!(Variant::Bool(true).to_int(), Some(1));
        assert_eq!(Variant::UInt(u64::MAX).to_int(), None);
        assert_eq!(Variant::from("abc").to_int(), None);
        assert_eq!(Variant::Double(f64::NAN).to_int(), None);
    }

    #[test]
    fn test_string_conversion_formats_scalars() {
        assert_eq!(Variant::Int(-7).to_string_value().as_deref(), Some("-7"));
        assert_eq!(Variant::from("bar.xml").to_string_value().as_deref(), Some("bar.xml"));
        assert_eq!(Variant::List(vec![]).to_string_value(), None);
    }
}
