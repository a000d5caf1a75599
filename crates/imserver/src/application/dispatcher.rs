//! Outbound dispatcher: delivers server-to-client calls.
//!
//! Calls are fire and forget. A call that fails because the peer is gone
//! does not tear the connection down on the spot; the id is queued and the
//! broker processes the queue once the current event has been handled, so
//! no state is mutated underneath the operation that triggered the send.

use std::sync::Arc;
use std::time::Duration;

use imserver_core::protocol::messages::ContextMessage;
use imserver_core::protocol::variant::{serialize_variant, Variant, VariantError};
use imserver_core::Rect;
use tracing::{debug, warn};

use super::channel::{ChannelError, ContextChannel};
use super::connection_registry::{ConnectionId, ConnectionRegistry};

#[derive(Debug, Default)]
pub struct OutboundDispatcher {
    pending_teardown: Vec<ConnectionId>,
}

impl OutboundDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `message` to connection `id`. Returns whether it was queued on
    /// the channel.
    pub fn send_to(
        &mut self,
        registry: &ConnectionRegistry,
        id: ConnectionId,
        message: ContextMessage,
    ) -> bool {
        let Some(connection) = registry.lookup(id) else {
            debug!("dropping {:?} for unknown connection {id}", message.message_type());
            return false;
        };
        let kind = message.message_type();
        match connection.channel.send(message) {
            Ok(()) => {
                debug!("sent {kind:?} to connection {id}");
                true
            }
            Err(ChannelError::Closed) => {
                warn!("connection {id} is gone; scheduling teardown");
                self.schedule_teardown(id);
                false
            }
            Err(e) => {
                warn!("failed to send {kind:?} to connection {id}: {e}");
                false
            }
        }
    }

    /// Sends `message` to the active connection, if there is one.
    pub fn send_to_active(
        &mut self,
        registry: &ConnectionRegistry,
        active: Option<ConnectionId>,
        message: ContextMessage,
    ) -> bool {
        match active {
            Some(id) => self.send_to(registry, id, message),
            None => {
                debug!("no active input context for {:?}", message.message_type());
                false
            }
        }
    }

    pub fn schedule_teardown(&mut self, id: ConnectionId) {
        if !self.pending_teardown.contains(&id) {
            self.pending_teardown.push(id);
        }
    }

    /// Takes the queued ids, leaving the queue empty.
    pub fn take_pending_teardown(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.pending_teardown)
    }
}

/// Encodes an input method region as the byte buffer sent with
/// `UpdateInputMethodArea`: a list holding the region's bounding rectangle.
pub fn region_payload(region: &[Rect]) -> Result<Vec<u8>, VariantError> {
    serialize_variant(&Variant::List(vec![Variant::Rect(Rect::bounding(region))]))
}

/// Runs a bounded preedit rectangle query.
///
/// `Ok(None)` means the input context answered but has no valid rectangle.
pub async fn query_preedit_rectangle(
    channel: Arc<dyn ContextChannel>,
    timeout: Duration,
) -> Result<Option<Rect>, ChannelError> {
    let reply = channel.query_preedit_rectangle(timeout).await?;
    Ok(reply.valid.then_some(reply.rect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::mock::RecordingChannel;
    use imserver_core::protocol::messages::PreeditRectangle;
    use imserver_core::protocol::variant::deserialize_variant;

    fn registry_with(channel: Arc<RecordingChannel>) -> (ConnectionRegistry, ConnectionId) {
        let mut registry = ConnectionRegistry::new();
        let id = registry.register(channel);
        (registry, id)
    }

    #[test]
    fn test_send_to_active_without_active_is_dropped() {
        // Arrange
        let channel = Arc::new(RecordingChannel::new());
        let (registry, _) = registry_with(channel.clone());
        let mut dispatcher = OutboundDispatcher::new();

        // Act
        let sent = dispatcher.send_to_active(&registry, None, ContextMessage::Copy);

        // Assert
        assert!(!sent);
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn test_closed_channel_schedules_teardown_once() {
        // Arrange
        let channel = Arc::new(RecordingChannel::new());
        channel.disconnect_peer();
        let (registry, id) = registry_with(channel);
        let mut dispatcher = OutboundDispatcher::new();

        // Act
        dispatcher.send_to(&registry, id, ContextMessage::Copy);
        dispatcher.send_to(&registry, id, ContextMessage::Paste);

        // Assert
        assert_eq!(dispatcher.take_pending_teardown(), vec![id]);
        assert!(dispatcher.take_pending_teardown().is_empty());
    }

    #[test]
    fn test_region_payload_holds_bounding_rect() {
        // Arrange
        let region = [Rect::new(0, 600, 480, 254), Rect::new(400, 560, 80, 40)];

        // Act
        let bytes = region_payload(&region).unwrap();

        // Assert
        assert_eq!(
            deserialize_variant(&bytes).unwrap(),
            Variant::List(vec![Variant::Rect(Rect::new(0, 560, 480, 294))])
        );
    }

    #[tokio::test]
    async fn test_query_maps_invalid_reply_to_none() {
        // Arrange
        let channel = Arc::new(RecordingChannel::new());
        channel.set_preedit_reply(PreeditRectangle {
            valid: false,
            rect: Rect::new(1, 1, 1, 1),
        });

        // Act
        let result = query_preedit_rectangle(channel, Duration::from_millis(10)).await;

        // Assert
        assert_eq!(result, Ok(None));
    }

    #[tokio::test]
    async fn test_query_without_reply_times_out() {
        let channel = Arc::new(RecordingChannel::new());
        let result = query_preedit_rectangle(channel, Duration::from_millis(10)).await;
        assert_eq!(result, Err(ChannelError::Timeout(Duration::from_millis(10))));
    }
}
