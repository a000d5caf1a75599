//! Per-connection socket task and the [`SocketChannel`] handed to the broker.
//!
//! Each accepted stream is split in two:
//!
//! - a **writer task** drains an unbounded queue of encoded frames into the
//!   write half, so the broker never waits on a slow peer;
//! - the **reader loop** reads one frame at a time (16-byte header, then
//!   `payload_len` bytes) and forwards decoded calls to the broker.
//!
//! Preedit rectangle replies never reach the broker. They complete the
//! pending query registered under the same serial.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use imserver_core::protocol::codec::{decode_body, decode_header, encode_message};
use imserver_core::protocol::messages::{ContextMessage, PreeditRectangle, HEADER_SIZE};
use imserver_core::protocol::sequence::SequenceCounter;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::application::broker::BrokerEvent;
use crate::application::channel::{ChannelError, ContextChannel};
use crate::application::connection_registry::ConnectionId;

type PendingQueries = HashMap<u64, oneshot::Sender<PreeditRectangle>>;

/// Outbound half of one socket connection.
pub struct SocketChannel {
    frames: mpsc::UnboundedSender<Vec<u8>>,
    serials: SequenceCounter,
    pending: Mutex<PendingQueries>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

impl SocketChannel {
    fn new(frames: mpsc::UnboundedSender<Vec<u8>>, shutdown: watch::Sender<bool>) -> Self {
        Self {
            frames,
            serials: SequenceCounter::new(),
            pending: Mutex::new(HashMap::new()),
            shutdown,
            closed: AtomicBool::new(false),
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingQueries> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_frame(&self, message: &ContextMessage, serial: u64) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        let frame =
            encode_message(message, serial).map_err(|e| ChannelError::Encode(e.to_string()))?;
        self.frames.send(frame).map_err(|_| ChannelError::Closed)
    }

    /// Completes the query waiting on `serial`. Returns whether one was.
    fn complete_query(&self, serial: u64, reply: PreeditRectangle) -> bool {
        match self.pending().remove(&serial) {
            Some(waiter) => waiter.send(reply).is_ok(),
            None => false,
        }
    }

    /// Drops every waiter so in-flight queries fail with `Closed`.
    fn fail_pending_queries(&self) {
        self.pending().clear();
    }

    fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

#[async_trait]
impl ContextChannel for SocketChannel {
    fn send(&self, message: ContextMessage) -> Result<(), ChannelError> {
        self.send_frame(&message, self.serials.next())
    }

    async fn query_preedit_rectangle(
        &self,
        timeout: Duration,
    ) -> Result<PreeditRectangle, ChannelError> {
        let serial = self.serials.next();
        let (tx, rx) = oneshot::channel();
        self.pending().insert(serial, tx);

        if let Err(e) = self.send_frame(&ContextMessage::PreeditRectangle, serial) {
            self.pending().remove(&serial);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                self.pending().remove(&serial);
                Err(ChannelError::Timeout(timeout))
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.send_replace(true);
        }
    }
}

/// Serves one accepted stream until the peer leaves or the broker closes it.
///
/// The broker learns about the connection through [`BrokerEvent::Connected`]
/// and, at the end, through [`BrokerEvent::Disconnected`].
pub async fn serve_connection(stream: UnixStream, events: mpsc::Sender<BrokerEvent>) {
    let (reader, writer) = stream.into_split();
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, _) = watch::channel(false);
    let channel = Arc::new(SocketChannel::new(frames_tx, shutdown_tx));

    let writer_task = tokio::spawn(write_loop(writer, frames_rx, channel.shutdown_receiver()));

    let (reply_tx, reply_rx) = oneshot::channel();
    let announced = events
        .send(BrokerEvent::Connected {
            channel: channel.clone(),
            reply: reply_tx,
        })
        .await;
    let id = match (announced, reply_rx.await) {
        (Ok(()), Ok(id)) => id,
        _ => {
            warn!("broker is not running; dropping new connection");
            channel.close();
            let _ = writer_task.await;
            return;
        }
    };

    read_loop(id, reader, &channel, &events).await;

    channel.fail_pending_queries();
    channel.close();
    let _ = events.send(BrokerEvent::Disconnected(id)).await;
    let _ = writer_task.await;
    debug!("socket task for input context {id} finished");
}

async fn read_loop(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    channel: &SocketChannel,
    events: &mpsc::Sender<BrokerEvent>,
) {
    let mut shutdown = channel.shutdown_receiver();

    loop {
        let mut header_buf = [0u8; HEADER_SIZE];
        let read = tokio::select! {
            read = reader.read_exact(&mut header_buf) => read,
            _ = shutdown.wait_for(|closed| *closed) => {
                debug!("input context {id} closed by broker");
                break;
            }
        };
        if let Err(e) = read {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                info!("input context {id} hung up");
            } else {
                error!("read error on input context {id}: {e}");
            }
            break;
        }

        let header = match decode_header(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                warn!("unusable frame header from input context {id}: {e}; closing");
                break;
            }
        };

        let mut payload = vec![0u8; header.payload_len];
        if let Err(e) = reader.read_exact(&mut payload).await {
            error!("truncated frame from input context {id}: {e}");
            break;
        }

        let envelope = match decode_body(&header, &payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("dropping malformed call from input context {id}: {e}");
                continue;
            }
        };

        match envelope.message {
            ContextMessage::PreeditRectangleReply(reply) => {
                if !channel.complete_query(envelope.serial, reply) {
                    debug!(
                        "late preedit rectangle reply {} from input context {id}",
                        envelope.serial
                    );
                }
            }
            message => {
                let call = BrokerEvent::Call {
                    connection: id,
                    message,
                };
                if events.send(call).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = writer.write_all(&frame).await {
                    warn!("write to input context failed: {e}");
                    break;
                }
            }
            _ = async { let _ = shutdown.wait_for(|closed| *closed).await; } => break,
        }
    }
    let _ = writer.shutdown().await;
}
