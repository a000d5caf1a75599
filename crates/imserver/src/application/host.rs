//! Application host: the process-level object the broker reports to.
//!
//! Window-manager hints and show/hide requests go to the host rather than to
//! the input method itself, because they concern the server's own surface.

/// Callbacks into the application that hosts the input method surface.
pub trait ApplicationHost: Send + Sync {
    /// Marks `window_id` as the transient parent of the input method surface.
    fn set_transient_hint(&self, window_id: i64);

    /// A client asked for the input method to be shown.
    fn show_input_method_requested(&self);

    /// A client asked for the input method to be hidden.
    fn hide_input_method_requested(&self);
}
