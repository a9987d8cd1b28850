//! Call session state machine.
//!
//! The engine tracks at most one [`CallSession`] at a time. Status changes go
//! through [`CallSession::apply_transition`] exclusively; the transition
//! table there is the single source of truth, and the `muted` / `on_hold` /
//! `recording` flags never imply a status by themselves.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Direction of a call, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Status of the active call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Outbound call: invite sent, waiting for the connection.
    Connecting,
    /// Part of the status vocabulary for consumers; the engine itself never
    /// assigns it (inbound accept goes directly to `Answered`).
    Ringing,
    /// Call is established.
    Answered,
    /// Call is locally on hold.
    Hold,
    /// Transfer requested; the session is expected to end with a `bye`.
    Transferring,
    /// Conference invite sent; same soft-terminal staging as `Transferring`.
    Conferencing,
    /// Call ended.
    Ended,
    /// Call failed or was cancelled.
    Failed,
}

impl CallStatus {
    /// Whether the session can still change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }

    /// Whether media is expected to be flowing.
    pub fn is_established(&self) -> bool {
        matches!(
            self,
            Self::Answered | Self::Hold | Self::Transferring | Self::Conferencing
        )
    }
}

/// State transitions for the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTransition {
    /// The negotiation adapter reported the connection established.
    ConnectionEstablished,
    /// The remote peer answered our invite.
    RemoteAnswered,
    Hold,
    Resume,
    TransferStarted,
    ConferenceStarted,
    /// Local end-call or a correlated `bye`.
    Ended,
    /// Correlated `cancel` or fatal connectivity failure.
    Failed,
}

/// Attempted transition outside the table.
#[derive(Debug, Clone, Error)]
#[error("cannot apply {attempted:?} in status {status:?}")]
pub struct InvalidTransition {
    pub status: CallStatus,
    pub attempted: CallTransition,
}

/// The single call session tracked by the engine.
///
/// Created only by dialing out or accepting an inbound invite; destroyed on
/// termination or teardown. The engine owns the one instance and hands out
/// clones as snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    /// Engine-local call identifier.
    pub id: String,
    /// Wire-level session identifier, paired with `id` for correlation.
    pub session_id: String,
    pub from: String,
    pub to: String,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub start_time: DateTime<Utc>,
    pub muted: bool,
    pub on_hold: bool,
    pub recording: bool,
    /// Populated externally once a recording location is known.
    pub recording_url: Option<String>,
}

impl CallSession {
    /// Create an outbound session in `Connecting`.
    pub fn new_outbound(
        id: impl Into<String>,
        session_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::new(id, session_id, from, to, CallDirection::Outbound, CallStatus::Connecting)
    }

    /// Create an inbound session directly in `Answered` (the accept flow
    /// bypasses `Connecting` and `Ringing`).
    pub fn new_inbound(
        id: impl Into<String>,
        session_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::new(id, session_id, from, to, CallDirection::Inbound, CallStatus::Answered)
    }

    fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        direction: CallDirection,
        status: CallStatus,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            from: from.into(),
            to: to.into(),
            direction,
            status,
            start_time: Utc::now(),
            muted: false,
            on_hold: false,
            recording: false,
            recording_url: None,
        }
    }

    /// Seconds elapsed since the session was created. Derived on demand;
    /// nothing in the engine keeps a counter running.
    pub fn duration_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.start_time).num_seconds()
    }

    /// Whether a wire call id refers to this session.
    pub fn matches(&self, call_id: &str) -> bool {
        self.id == call_id || self.session_id == call_id
    }

    /// Apply a state transition. Returns an error for any edge not in the
    /// transition table; the session is unchanged in that case.
    pub fn apply_transition(
        &mut self,
        transition: CallTransition,
    ) -> Result<(), InvalidTransition> {
        use CallStatus::*;
        use CallTransition as T;

        let next = match (self.status, transition) {
            (Connecting, T::ConnectionEstablished | T::RemoteAnswered) => Answered,
            (Answered, T::Hold) => Hold,
            (Hold, T::Resume) => Answered,
            (Answered, T::TransferStarted) => Transferring,
            (Answered, T::ConferenceStarted) => Conferencing,
            (Connecting | Answered | Hold | Transferring | Conferencing, T::Ended) => Ended,
            (status, T::Failed) if !status.is_terminal() => Failed,
            (status, attempted) => {
                return Err(InvalidTransition { status, attempted });
            }
        };
        self.status = next;
        Ok(())
    }
}

/// Generate an opaque 32-char uppercase hex identifier for call/session ids.
pub fn generate_id() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound() -> CallSession {
        CallSession::new_outbound("c1", "s1", "+15559990000", "+15551230000")
    }

    fn inbound() -> CallSession {
        CallSession::new_inbound("c2", "s2", "+15551230000", "+15559990000")
    }

    /// Outbound flow: Connecting → Answered → Ended.
    #[test]
    fn test_outbound_happy_path() {
        let mut session = outbound();
        assert_eq!(session.status, CallStatus::Connecting);
        assert_eq!(session.direction, CallDirection::Outbound);

        session
            .apply_transition(CallTransition::ConnectionEstablished)
            .unwrap();
        assert_eq!(session.status, CallStatus::Answered);

        session.apply_transition(CallTransition::Ended).unwrap();
        assert_eq!(session.status, CallStatus::Ended);
        assert!(session.status.is_terminal());
    }

    /// Inbound accept bypasses Connecting and Ringing entirely.
    #[test]
    fn test_inbound_starts_answered() {
        let session = inbound();
        assert_eq!(session.status, CallStatus::Answered);
        assert_eq!(session.direction, CallDirection::Inbound);
    }

    #[test]
    fn test_hold_is_bidirectional() {
        let mut session = inbound();

        session.apply_transition(CallTransition::Hold).unwrap();
        assert_eq!(session.status, CallStatus::Hold);

        session.apply_transition(CallTransition::Resume).unwrap();
        assert_eq!(session.status, CallStatus::Answered);
    }

    #[test]
    fn test_transfer_has_no_return_edge() {
        let mut session = inbound();
        session
            .apply_transition(CallTransition::TransferStarted)
            .unwrap();
        assert_eq!(session.status, CallStatus::Transferring);

        // Soft-terminal: only bye/cancel paths leave it
        assert!(session.apply_transition(CallTransition::Resume).is_err());
        assert!(
            session
                .apply_transition(CallTransition::ConnectionEstablished)
                .is_err()
        );
        session.apply_transition(CallTransition::Ended).unwrap();
        assert_eq!(session.status, CallStatus::Ended);
    }

    #[test]
    fn test_conference_then_remote_cancel_fails_session() {
        let mut session = inbound();
        session
            .apply_transition(CallTransition::ConferenceStarted)
            .unwrap();
        session.apply_transition(CallTransition::Failed).unwrap();
        assert_eq!(session.status, CallStatus::Failed);
    }

    #[test]
    fn test_any_nonterminal_state_can_fail() {
        for transition in [
            None,
            Some(CallTransition::ConnectionEstablished),
        ] {
            let mut session = outbound();
            if let Some(t) = transition {
                session.apply_transition(t).unwrap();
            }
            session.apply_transition(CallTransition::Failed).unwrap();
            assert_eq!(session.status, CallStatus::Failed);
        }
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let mut session = outbound();
        session.apply_transition(CallTransition::Ended).unwrap();

        for attempted in [
            CallTransition::ConnectionEstablished,
            CallTransition::RemoteAnswered,
            CallTransition::Hold,
            CallTransition::Resume,
            CallTransition::TransferStarted,
            CallTransition::ConferenceStarted,
            CallTransition::Ended,
            CallTransition::Failed,
        ] {
            let err = session.apply_transition(attempted).unwrap_err();
            assert_eq!(err.status, CallStatus::Ended);
            assert_eq!(session.status, CallStatus::Ended, "session must be unchanged");
        }
    }

    #[test]
    fn test_hold_requires_answered() {
        let mut session = outbound();
        assert!(session.apply_transition(CallTransition::Hold).is_err());
        assert_eq!(session.status, CallStatus::Connecting);
    }

    #[test]
    fn test_matches_either_identifier() {
        let session = outbound();
        assert!(session.matches("c1"));
        assert!(session.matches("s1"));
        assert!(!session.matches("c9"));
    }

    #[test]
    fn test_generated_ids_are_opaque_hex() {
        let id = generate_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_id());
    }
}
