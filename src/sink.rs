//! Delivery sink abstraction and the channel-backed adapter.

use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::notify::WireMessage;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors a sink can report for a delivery attempt.
///
/// The delivery core treats every error identically to the sink returning
/// `Ok(false)`: the attempt failed and the event is retried or dropped.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The session's connection is gone.
    #[error("connection closed for thread {thread_id}")]
    ConnectionClosed { thread_id: String },

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Transport collaborator that writes messages to a user's connection.
///
/// `Ok(true)` means the transport accepted the message for delivery;
/// `Ok(false)` or an error means the attempt failed.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send_to_thread(&self, thread_id: &str, message: &WireMessage) -> SinkResult<bool>;
}

/// Sink that forwards messages into a bounded per-session channel.
///
/// The receiving half is drained by whatever owns the actual socket (the
/// WebSocket write task, in the usual deployment). Sends never block: a full
/// buffer is reported as a failed attempt so a slow connection backpressures
/// into the retry queue instead of into the producer.
pub struct ChannelSink {
    tx: mpsc::Sender<(String, WireMessage)>,
}

impl ChannelSink {
    /// Create a sink and the receiver the socket writer should drain.
    ///
    /// Messages arrive as `(thread_id, message)` pairs.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<(String, WireMessage)>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send_to_thread(&self, thread_id: &str, message: &WireMessage) -> SinkResult<bool> {
        match self.tx.try_send((thread_id.to_string(), message.clone())) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("send buffer full for thread {}", thread_id);
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::ConnectionClosed {
                thread_id: thread_id.to_string(),
            }),
        }
    }
}
