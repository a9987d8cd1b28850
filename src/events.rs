//! Engine events and subscriber traits.
//!
//! Both subscriber slots are single-occupancy: registering a handler
//! replaces the previous one. There is no fan-out.

use crate::media::MediaStream;
use crate::state::CallSession;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// An inbound invite awaiting an external decision (auto-answer disabled).
///
/// The decision-maker accepts with
/// [`CallEngine::accept_invite`](crate::CallEngine::accept_invite) or
/// declines with [`CallEngine::reject_invite`](crate::CallEngine::reject_invite).
#[derive(Debug, Clone)]
pub struct IncomingCall {
    pub call_id: String,
    pub session_id: String,
    pub from: String,
    /// The remote SDP offer, needed to accept.
    pub sdp: String,
    pub received_at: DateTime<Utc>,
}

/// Out-of-band call events delivered to the event subscriber.
#[derive(Clone)]
pub enum CallEvent {
    IncomingCall(IncomingCall),
    /// The remote media stream arrived and can be rendered.
    RemoteStream(Arc<dyn MediaStream>),
}

impl std::fmt::Debug for CallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncomingCall(info) => f.debug_tuple("IncomingCall").field(info).finish(),
            Self::RemoteStream(_) => f.write_str("RemoteStream"),
        }
    }
}

/// Receives a session snapshot after every session mutation. `None` means
/// the session was cleared.
#[async_trait::async_trait]
pub trait SessionStateHandler: Send + Sync {
    async fn on_session_changed(&self, session: Option<CallSession>);
}

/// Receives out-of-band call events.
#[async_trait::async_trait]
pub trait CallEventHandler: Send + Sync {
    async fn on_call_event(&self, event: CallEvent);
}
