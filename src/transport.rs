//! Signaling transport capability.
//!
//! The engine never owns the connection. The embedder implements
//! [`SignalingTransport`] over whatever carries the signaling channel
//! (typically a websocket) and feeds received text to
//! [`CallEngine::handle_message`](crate::CallEngine::handle_message) from its
//! own receive loop.
//!
//! Outbound delivery is best-effort: when the transport reports
//! disconnected, the dispatcher drops the message with a warning. There is
//! no queue and no retry; reconnection is the embedder's concern.

#[async_trait::async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Send one encoded signaling message.
    async fn send(&self, payload: &str) -> anyhow::Result<()>;

    /// Whether the underlying connection is currently up.
    fn is_connected(&self) -> bool;
}
