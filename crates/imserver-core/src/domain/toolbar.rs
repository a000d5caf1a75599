//! Global toolbar identity and toolbar data.

use std::collections::BTreeMap;
use std::fmt;

use crate::protocol::variant::Variant;

/// Globally unique toolbar id.
///
/// Pairs the toolbar number chosen by an input context (`local_id`) with the
/// identity of the connection that sent it (`service`). Equality and hashing
/// use both parts, so "toolbar 5" of connection 0 and "toolbar 5" of
/// connection 1 are different toolbars.
///
/// # Examples
///
/// ```rust
/// use imserver_core::ToolbarId;
///
/// let id = ToolbarId::new(5, "0");
/// assert!(id.is_valid());
/// assert_ne!(id, ToolbarId::new(5, "1"));
/// assert!(!ToolbarId::default().is_valid());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolbarId {
    pub local_id: i32,
    pub service: String,
}

impl ToolbarId {
    /// Sentinel local id meaning "no toolbar".
    pub const NO_ID: i32 = -1;

    pub fn new(local_id: i32, service: impl Into<String>) -> Self {
        Self {
            local_id,
            service: service.into(),
        }
    }

    /// `false` for the sentinel local id or an empty service part.
    pub fn is_valid(&self) -> bool {
        self.local_id != Self::NO_ID && !self.service.is_empty()
    }
}

impl Default for ToolbarId {
    fn default() -> Self {
        Self {
            local_id: Self::NO_ID,
            service: String::new(),
        }
    }
}

impl fmt::Display for ToolbarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_id, self.service)
    }
}

/// What the toolbar registry knows about one registered toolbar.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolbarData {
    pub id: ToolbarId,
    /// Path of the descriptor file the toolbar was registered with.
    pub descriptor_path: String,
    /// Item attribute overrides, keyed by item name then attribute name.
    pub item_attributes: BTreeMap<String, BTreeMap<String, Variant>>,
}

impl ToolbarData {
    pub fn new(id: ToolbarId, descriptor_path: impl Into<String>) -> Self {
        Self {
            id,
            descriptor_path: descriptor_path.into(),
            item_attributes: BTreeMap::new(),
        }
    }

    /// Looks up one item attribute override.
    pub fn item_attribute(&self, item: &str, attribute: &str) -> Option<&Variant> {
        self.item_attributes.get(item)?.get(attribute)
    }
}
