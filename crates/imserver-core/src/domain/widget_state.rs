//! Widget attribute snapshot pushed by an input context.
//!
//! A [`WidgetState`] is always replaced wholesale; it is never merged field by
//! field. Accessors return `None` when an attribute is absent (or cannot be
//! read as the expected type). Absence is not an error: the caller picks the
//! fallback.

use std::collections::HashMap;

use tracing::debug;

use crate::protocol::variant::{Variant, VariantMap};

/// The fixed set of attributes a widget can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetAttribute {
    FocusState,
    ContentType,
    CorrectionEnabled,
    PredictionEnabled,
    AutoCapitalizationEnabled,
    SurroundingText,
    CursorPosition,
    HasSelection,
    InputMethodMode,
    VisualizationPriority,
    ToolbarId,
    Toolbar,
    WindowId,
}

impl WidgetAttribute {
    pub const ALL: [WidgetAttribute; 13] = [
        WidgetAttribute::FocusState,
        WidgetAttribute::ContentType,
        WidgetAttribute::CorrectionEnabled,
        WidgetAttribute::PredictionEnabled,
        WidgetAttribute::AutoCapitalizationEnabled,
        WidgetAttribute::SurroundingText,
        WidgetAttribute::CursorPosition,
        WidgetAttribute::HasSelection,
        WidgetAttribute::InputMethodMode,
        WidgetAttribute::VisualizationPriority,
        WidgetAttribute::ToolbarId,
        WidgetAttribute::Toolbar,
        WidgetAttribute::WindowId,
    ];

    /// Key used for this attribute in the serialized state map.
    pub fn as_str(self) -> &'static str {
        match self {
            WidgetAttribute::FocusState => "focusState",
            WidgetAttribute::ContentType => "contentType",
            WidgetAttribute::CorrectionEnabled => "correctionEnabled",
            WidgetAttribute::PredictionEnabled => "predictionEnabled",
            WidgetAttribute::AutoCapitalizationEnabled => "autocapitalizationEnabled",
            WidgetAttribute::SurroundingText => "surroundingText",
            WidgetAttribute::CursorPosition => "cursorPosition",
            WidgetAttribute::HasSelection => "hasSelection",
            WidgetAttribute::InputMethodMode => "inputMethodMode",
            WidgetAttribute::VisualizationPriority => "visualizationPriority",
            WidgetAttribute::ToolbarId => "toolbarId",
            WidgetAttribute::Toolbar => "toolbar",
            WidgetAttribute::WindowId => "winId",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|attr| attr.as_str() == name)
    }
}

/// Latest full attribute snapshot of the focused widget of one connection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WidgetState {
    values: HashMap<WidgetAttribute, Variant>,
}

impl WidgetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from a deserialized state map. Unknown keys are
    /// skipped.
    pub fn from_variant_map(map: VariantMap) -> Self {
        let mut values = HashMap::with_capacity(map.len());
        for (key, value) in map {
            match WidgetAttribute::from_name(&key) {
                Some(attr) => {
                    values.insert(attr, value);
                }
                None => debug!("ignoring unknown widget attribute {key:?}"),
            }
        }
        Self { values }
    }

    /// Inverse of [`from_variant_map`](Self::from_variant_map); used by
    /// input-context implementations to build the outgoing buffer.
    pub fn to_variant_map(&self) -> VariantMap {
        self.values
            .iter()
            .map(|(attr, value)| (attr.as_str().to_string(), value.clone()))
            .collect()
    }

    /// Builder-style setter.
    pub fn with(mut self, attr: WidgetAttribute, value: impl Into<Variant>) -> Self {
        self.values.insert(attr, value.into());
        self
    }

    pub fn get(&self, attr: WidgetAttribute) -> Option<&Variant> {
        self.values.get(&attr)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn flag(&self, attr: WidgetAttribute) -> Option<bool> {
        self.get(attr).map(|v| v.to_bool().unwrap_or(false))
    }

    fn int(&self, attr: WidgetAttribute) -> Option<i64> {
        self.get(attr).and_then(Variant::to_int)
    }

    // ── Typed accessors ───────────────────────────────────────────────────────

    /// Text around the cursor and the cursor position inside it.
    ///
    /// Needs both the text and the cursor position attributes.
    pub fn surrounding_text(&self) -> Option<(String, i32)> {
        let text = self.get(WidgetAttribute::SurroundingText)?;
        let pos = self.get(WidgetAttribute::CursorPosition)?;
        Some((
            text.to_string_value().unwrap_or_default(),
            pos.to_int().and_then(|p| i32::try_from(p).ok()).unwrap_or(0),
        ))
    }

    pub fn cursor_position(&self) -> Option<i32> {
        self.int(WidgetAttribute::CursorPosition)
            .and_then(|p| i32::try_from(p).ok())
    }

    pub fn has_selection(&self) -> Option<bool> {
        self.flag(WidgetAttribute::HasSelection)
    }

    pub fn input_method_mode(&self) -> Option<i32> {
        self.int(WidgetAttribute::InputMethodMode)
            .and_then(|m| i32::try_from(m).ok())
    }

    /// Native id of the window that owns the widget.
    pub fn window_id(&self) -> Option<i64> {
        self.int(WidgetAttribute::WindowId)
    }

    pub fn content_type(&self) -> Option<i32> {
        self.int(WidgetAttribute::ContentType)
            .and_then(|t| i32::try_from(t).ok())
    }

    pub fn correction_enabled(&self) -> Option<bool> {
        self.flag(WidgetAttribute::CorrectionEnabled)
    }

    pub fn prediction_enabled(&self) -> Option<bool> {
        self.flag(WidgetAttribute::PredictionEnabled)
    }

    pub fn auto_capitalization_enabled(&self) -> Option<bool> {
        self.flag(WidgetAttribute::AutoCapitalizationEnabled)
    }

    pub fn focus_state(&self) -> Option<bool> {
        self.flag(WidgetAttribute::FocusState)
    }

    pub fn visualization_priority(&self) -> Option<bool> {
        self.flag(WidgetAttribute::VisualizationPriority)
    }

    /// Connection-local toolbar number.
    pub fn toolbar_local_id(&self) -> Option<i32> {
        self.int(WidgetAttribute::ToolbarId)
            .and_then(|id| i32::try_from(id).ok())
    }

    /// Toolbar descriptor path.
    pub fn toolbar_descriptor(&self) -> Option<String> {
        self.get(WidgetAttribute::Toolbar)
            .and_then(Variant::to_string_value)
    }
}
