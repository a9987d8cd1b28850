//! Signaling dispatcher: outbound sends and inbound message routing.
//!
//! Outbound delivery is fire-and-forget: a message is dropped with a warning
//! when the transport is down or the send fails. There is no queue and no
//! retry; delivery guarantees and reconnection sit with the embedder.
//!
//! Inbound handling is defensive: a message that fails to decode, does not
//! correlate to the active session, or would make an invalid transition is
//! ignored, because the transport may race with local teardown. Errors here
//! never propagate to the embedder's receive loop.

use crate::engine::CallEngine;
use crate::events::{CallEvent, IncomingCall};
use crate::media::IceCandidate;
use crate::message::{DtmfPayload, SignalingMessage};
use crate::state::CallTransition;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;

impl CallEngine {
    /// Serialize and send one message through the transport capability.
    /// Dropped with a warning when the transport reports disconnected.
    pub(crate) async fn send_message(&self, message: &SignalingMessage) {
        if !self.transport.is_connected() {
            warn!(
                "transport disconnected, dropping outbound {} (call_id: {})",
                message.kind(),
                message.call_id()
            );
            return;
        }
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to encode {} message: {}", message.kind(), err);
                return;
            }
        };
        if let Err(err) = self.transport.send(&payload).await {
            warn!("failed to send {} message: {err:#}", message.kind());
        }
    }

    /// Route one inbound signaling message. The embedder calls this from
    /// its transport receive loop with the raw message text.
    pub async fn handle_message(self: &Arc<Self>, raw: &str) {
        let message = match SignalingMessage::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!("ignoring malformed signaling message: {}", err);
                return;
            }
        };
        debug!(
            "received {} (call_id: {})",
            message.kind(),
            message.call_id()
        );

        match message {
            SignalingMessage::Invite {
                call_id,
                session_id,
                from,
                sdp,
                ..
            } => {
                self.handle_invite(call_id, session_id, from, sdp).await;
            }
            SignalingMessage::Ack {
                call_id, sdp, ..
            } => {
                self.handle_ack(&call_id, &sdp).await;
            }
            SignalingMessage::Bye { call_id, .. } => {
                self.handle_bye(&call_id).await;
            }
            SignalingMessage::Cancel { call_id, .. } => {
                self.handle_cancel(&call_id).await;
            }
            SignalingMessage::Register { address, .. } => {
                // informational pass-through, no state change
                info!("peer registration notice for {address}");
            }
            SignalingMessage::Options { call_id, from, .. } => {
                let reply = SignalingMessage::Ok {
                    call_id,
                    to: from,
                };
                self.send_message(&reply).await;
            }
            SignalingMessage::Ok { call_id, .. } => {
                debug!("ok acknowledgement (call_id: {call_id})");
            }
            SignalingMessage::Info {
                call_id,
                hold,
                recording,
                dtmf,
                candidate,
                ..
            } => {
                self.handle_info(&call_id, hold, recording, dtmf, candidate)
                    .await;
            }
            SignalingMessage::Refer { call_id, .. } => {
                // this engine only originates transfers
                debug!("unhandled inbound refer (call_id: {call_id})");
            }
        }
    }

    /// Inbound invite: auto-answer runs the accept sub-flow immediately;
    /// otherwise the external decision-maker gets an incoming-call event and
    /// no session is created yet.
    async fn handle_invite(
        self: &Arc<Self>,
        call_id: String,
        session_id: String,
        from: String,
        sdp: String,
    ) {
        let Ok(config) = self.require_config().await else {
            debug!("invite before initialization, ignoring (call_id: {call_id})");
            return;
        };
        if self.session.read().await.is_some() {
            warn!("invite while a session is active, ignoring (call_id: {call_id})");
            return;
        }

        if config.auto_answer {
            if let Err(err) = self
                .accept_invite(&call_id, &session_id, &from, &sdp)
                .await
            {
                warn!("auto-answer failed (call_id: {call_id}): {err}");
            }
        } else {
            self.notify_event(CallEvent::IncomingCall(IncomingCall {
                call_id,
                session_id,
                from,
                sdp,
                received_at: Utc::now(),
            }))
            .await;
        }
    }

    /// Correlated ack answers our invite: apply the remote SDP answer and
    /// move to `Answered`.
    async fn handle_ack(&self, call_id: &str, sdp: &str) {
        let correlated = self
            .session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| s.matches(call_id));
        if !correlated {
            debug!("ack for unknown call {call_id}, ignoring");
            return;
        }

        if !sdp.is_empty() {
            if let Err(err) = self.adapter.set_remote_description(sdp).await {
                warn!("failed to apply remote answer (call_id: {call_id}): {err}");
            }
        }

        let snapshot = {
            let mut guard = self.session.write().await;
            match guard.as_mut() {
                Some(session) if session.matches(call_id) => {
                    match session.apply_transition(CallTransition::RemoteAnswered) {
                        Ok(()) => Some(session.clone()),
                        Err(err) => {
                            debug!("ack ignored: {err}");
                            None
                        }
                    }
                }
                _ => None,
            }
        };
        if let Some(session) = snapshot {
            self.notify_state(Some(session)).await;
        }
    }

    /// Correlated bye ends the session and clears it.
    async fn handle_bye(&self, call_id: &str) {
        let ended = {
            let mut guard = self.session.write().await;
            if guard.as_ref().is_some_and(|s| s.matches(call_id)) {
                guard.take().map(|mut session| {
                    session.apply_transition(CallTransition::Ended).ok();
                    session
                })
            } else {
                None
            }
        };
        match ended {
            Some(session) => {
                self.adapter.teardown().await;
                self.notify_state(Some(session)).await;
            }
            None => debug!("bye for unknown call {call_id}, ignoring"),
        }
    }

    /// Correlated cancel fails the session and clears it.
    async fn handle_cancel(&self, call_id: &str) {
        let correlated = self
            .session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| s.matches(call_id));
        if correlated {
            self.fail_active_session().await;
        } else {
            debug!("cancel for unknown call {call_id}, ignoring");
        }
    }

    /// Multiplexed in-call info: hold flag, recording flag and ICE candidate
    /// are independent and may co-occur in one message.
    async fn handle_info(
        &self,
        call_id: &str,
        hold: Option<bool>,
        recording: Option<bool>,
        dtmf: Option<DtmfPayload>,
        candidate: Option<IceCandidate>,
    ) {
        let correlated = self
            .session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| s.matches(call_id));
        if !correlated {
            debug!("info for unknown call {call_id}, ignoring");
            return;
        }

        if let Some(candidate) = candidate {
            if let Err(err) = self.adapter.add_ice_candidate(candidate).await {
                warn!("failed to apply remote ICE candidate: {err}");
            }
        }

        if let Some(payload) = dtmf {
            debug!("remote DTMF digit {:?} (call_id: {call_id})", payload.digit);
        }

        let snapshot = {
            let mut guard = self.session.write().await;
            match guard.as_mut() {
                Some(session) if session.matches(call_id) => {
                    let mut changed = false;

                    if let Some(flag) = hold {
                        if flag != session.on_hold {
                            let transition = if flag {
                                CallTransition::Hold
                            } else {
                                CallTransition::Resume
                            };
                            match session.apply_transition(transition) {
                                Ok(()) => {
                                    session.on_hold = flag;
                                    changed = true;
                                }
                                Err(err) => debug!("remote hold flag ignored: {err}"),
                            }
                        }
                    }

                    if let Some(flag) = recording {
                        if flag != session.recording {
                            session.recording = flag;
                            changed = true;
                        }
                    }

                    changed.then(|| session.clone())
                }
                _ => None,
            }
        };
        if let Some(session) = snapshot {
            self.notify_state(Some(session)).await;
        }
    }
}
