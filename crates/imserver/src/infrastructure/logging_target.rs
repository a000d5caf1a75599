//! Headless stand-ins for the input method UI and its host application.
//!
//! The `imserver` binary runs without an on-screen keyboard. These adapters
//! log what a real plugin or host would act on, which is enough to watch the
//! broker work with `RUST_LOG=imserver=debug`.

use std::sync::Arc;

use imserver_core::protocol::messages::KeyEvent;
use imserver_core::{Point, Rect, ToolbarData};
use tracing::{debug, info};

use crate::application::host::ApplicationHost;
use crate::application::targets::InputMethodTarget;

/// An [`InputMethodTarget`] that logs every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTarget;

impl InputMethodTarget for LoggingTarget {
    fn client_changed(&self) {
        info!("active input context changed");
    }

    fn mouse_clicked_on_preedit(&self, pos: Point, preedit_rect: Rect) {
        debug!("preedit clicked at {pos:?} inside {preedit_rect:?}");
    }

    fn set_preedit(&self, text: &str) {
        debug!("preedit set to {text:?}");
    }

    fn reset(&self) {
        debug!("reset");
    }

    fn focus_changed(&self, focused: bool) {
        info!("focus {}", if focused { "gained" } else { "lost" });
    }

    fn visualization_priority_changed(&self, priority: bool) {
        debug!("visualization priority {priority}");
    }

    fn set_toolbar(&self, toolbar: Option<Arc<ToolbarData>>) {
        match toolbar {
            Some(data) => info!("toolbar {} from {}", data.id, data.descriptor_path),
            None => info!("no toolbar"),
        }
    }

    fn update(&self) {
        debug!("widget state updated");
    }

    fn app_orientation_changed(&self, angle: i32) {
        info!("application orientation {angle}");
    }

    fn set_copy_paste_state(&self, copy_available: bool, paste_available: bool) {
        debug!("copy available {copy_available}, paste available {paste_available}");
    }

    fn process_key_event(&self, event: &KeyEvent, native_scan_code: u32, native_modifiers: u32) {
        debug!(
            "key {:?} code {} text {:?} (scan {native_scan_code}, modifiers {native_modifiers:#x})",
            event.event_type, event.key_code, event.text
        );
    }
}

/// An [`ApplicationHost`] with no surface: requests are only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHost;

impl ApplicationHost for LoggingHost {
    fn set_transient_hint(&self, window_id: i64) {
        debug!("transient for window {window_id:#x}");
    }

    fn show_input_method_requested(&self) {
        info!("show requested");
    }

    fn hide_input_method_requested(&self) {
        info!("hide requested");
    }
}
