//! The outbound half of one input-context connection.
//!
//! The broker never touches sockets. Each registered connection hands it an
//! `Arc<dyn ContextChannel>`; the socket transport implements it with a
//! writer queue, tests implement it with a recording double.

use std::time::Duration;

use async_trait::async_trait;
use imserver_core::protocol::messages::{ContextMessage, PreeditRectangle};
use thiserror::Error;

/// Why an outbound call could not be delivered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The peer is gone. The connection must be torn down.
    #[error("input context channel closed")]
    Closed,

    /// A query got no reply within its deadline.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The call could not be framed.
    #[error("cannot encode call: {0}")]
    Encode(String),
}

/// Server-to-client call channel of one connection.
#[async_trait]
pub trait ContextChannel: Send + Sync {
    /// Queues a fire-and-forget call.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Closed`] once the peer has gone away.
    fn send(&self, message: ContextMessage) -> Result<(), ChannelError>;

    /// Asks the input context for its preedit rectangle and waits at most
    /// `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Timeout`] when no reply arrives in time,
    /// [`ChannelError::Closed`] when the peer disconnects first.
    async fn query_preedit_rectangle(
        &self,
        timeout: Duration,
    ) -> Result<PreeditRectangle, ChannelError>;

    /// Releases the transport. Further sends fail with
    /// [`ChannelError::Closed`]. Calling it twice is harmless.
    fn close(&self);
}
