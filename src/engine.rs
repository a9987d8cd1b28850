//! Call engine: owns the session and drives call control.
//!
//! The engine tracks exactly one active [`CallSession`]. Control operations
//! each run a short sequence of negotiate (if needed) → build message → send
//! → mutate session → notify. Inbound signaling is routed by the dispatcher
//! (`dispatch.rs`) into the same state machine.
//!
//! Concurrency model: operations are async and suspend only at negotiation
//! points and lock acquisition. Individual session mutations are atomic
//! under the session lock, but overlapping control operations are not
//! serialized against each other across their suspension points; two racing
//! `toggle_hold` calls get whatever the interleaving produces.
//! There is no cancellation token and no timeout: an unanswered dial stays
//! in `Connecting` until an external collaborator cancels it, and an
//! in-flight negotiation is abandoned only by closing the peer connection.

use crate::config::SessionConfig;
use crate::error::{CallError, CallResult};
use crate::events::{CallEvent, CallEventHandler, SessionStateHandler};
use crate::media::{
    ConnectivityState, IceCandidate, MediaConstraints, MediaPlatform, MediaStream,
    NegotiationAdapter, PeerConnectionObserver,
};
use crate::message::{DtmfPayload, SignalingMessage};
use crate::state::{generate_id, CallSession, CallTransition};
use crate::transport::SignalingTransport;
use log::{debug, warn};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// Options for an outgoing call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Ask the remote side for video in the offer. The default profile
    /// requests audio only.
    pub video: bool,
}

impl CallOptions {
    pub fn audio() -> Self {
        Self::default()
    }

    pub fn video() -> Self {
        Self { video: true }
    }
}

/// Client-side call-session controller.
///
/// Construct with [`CallEngine::new`], then [`initialize`](Self::initialize)
/// with the session configuration before dialing or accepting calls. The
/// embedder feeds inbound signaling text to
/// [`handle_message`](Self::handle_message).
pub struct CallEngine {
    pub(crate) transport: Arc<dyn SignalingTransport>,
    pub(crate) adapter: NegotiationAdapter,
    pub(crate) config: RwLock<Option<SessionConfig>>,
    /// The one active session. `None` means no call.
    pub(crate) session: RwLock<Option<CallSession>>,
    state_handler: RwLock<Option<Arc<dyn SessionStateHandler>>>,
    event_handler: RwLock<Option<Arc<dyn CallEventHandler>>>,
}

impl CallEngine {
    /// Create an engine over the given transport and media platform.
    pub fn new(
        transport: Arc<dyn SignalingTransport>,
        platform: Arc<dyn MediaPlatform>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            adapter: NegotiationAdapter::new(platform),
            config: RwLock::new(None),
            session: RwLock::new(None),
            state_handler: RwLock::new(None),
            event_handler: RwLock::new(None),
        })
    }

    /// Apply the session configuration and acquire the local media stream.
    ///
    /// Returns `Ok(false)` when signaling is disabled or the config is
    /// unusable. Stream acquisition requests audio+video and downgrades to
    /// audio-only when only the video capture fails; a full capture failure
    /// is returned to the caller. Re-initializing replaces the previous
    /// configuration and media context wholesale.
    pub async fn initialize(
        self: &Arc<Self>,
        config: SessionConfig,
        existing_stream: Option<Arc<dyn MediaStream>>,
    ) -> CallResult<bool> {
        if !config.is_usable() {
            debug!("initialize skipped: signaling disabled or misconfigured");
            return Ok(false);
        }

        // Replace any previous media context before acquiring anew.
        self.adapter.release().await;
        self.adapter
            .acquire(existing_stream, MediaConstraints::audio_video())
            .await?;

        let register = SignalingMessage::Register {
            call_id: generate_id(),
            address: config.local_address.clone(),
            expires: None,
        };
        *self.config.write().await = Some(config);

        // Best-effort announcement; dropped silently if the transport is down.
        self.send_message(&register).await;
        Ok(true)
    }

    /// Dial out. Creates the session in `Connecting`, negotiates an SDP
    /// offer and sends the `invite`.
    ///
    /// Fails with [`CallError::SessionActive`] while a session exists; a
    /// negotiation failure marks the session `Failed`, clears it and is
    /// returned to the caller.
    pub async fn make_call(
        self: &Arc<Self>,
        to: &str,
        from: Option<&str>,
        options: CallOptions,
    ) -> CallResult<CallSession> {
        let config = self.require_config().await?;
        if !self.adapter.has_local_stream().await {
            return Err(CallError::NotInitialized);
        }

        let from = from.unwrap_or(&config.local_address).to_owned();
        let session = CallSession::new_outbound(generate_id(), generate_id(), &from, to);
        {
            let mut guard = self.session.write().await;
            if let Some(active) = guard.as_ref() {
                return Err(CallError::SessionActive(active.id.clone()));
            }
            *guard = Some(session.clone());
        }
        self.notify_state(Some(session.clone())).await;

        let offer = self.negotiate_offer(&config, options).await;
        let sdp = match offer {
            Ok(sdp) => sdp,
            Err(err) => {
                warn!("offer negotiation failed for call {}: {}", session.id, err);
                self.fail_active_session().await;
                return Err(err);
            }
        };

        let invite = SignalingMessage::Invite {
            call_id: session.id.clone(),
            session_id: session.session_id.clone(),
            from,
            to: to.to_owned(),
            sdp,
            conference: false,
        };
        self.send_message(&invite).await;

        Ok(session)
    }

    async fn negotiate_offer(
        self: &Arc<Self>,
        config: &SessionConfig,
        options: CallOptions,
    ) -> CallResult<String> {
        self.adapter
            .ensure_connection(&config.ice_servers, self.observer())
            .await?;
        self.adapter
            .create_offer(MediaConstraints {
                audio: true,
                video: options.video,
            })
            .await
    }

    /// Accept an inbound invite: apply the remote offer, answer, send `ack`
    /// and create the session directly in `Answered`.
    pub async fn accept_invite(
        self: &Arc<Self>,
        call_id: &str,
        session_id: &str,
        from: &str,
        sdp: &str,
    ) -> CallResult<CallSession> {
        let config = self.require_config().await?;
        if !self.adapter.has_local_stream().await {
            return Err(CallError::NotInitialized);
        }
        if let Some(active) = self.session.read().await.as_ref() {
            return Err(CallError::SessionActive(active.id.clone()));
        }

        self.adapter
            .ensure_connection(&config.ice_servers, self.observer())
            .await?;
        self.adapter.set_remote_description(sdp).await?;
        let answer = self.adapter.create_answer().await?;

        let ack = SignalingMessage::Ack {
            call_id: call_id.to_owned(),
            session_id: session_id.to_owned(),
            from: config.local_address.clone(),
            to: from.to_owned(),
            sdp: answer,
        };
        self.send_message(&ack).await;

        let session =
            CallSession::new_inbound(call_id, session_id, from, &config.local_address);
        *self.session.write().await = Some(session.clone());
        self.notify_state(Some(session.clone())).await;
        Ok(session)
    }

    /// Decline an inbound invite that has not been accepted. Sends a
    /// correlated `cancel`; no session is involved.
    pub async fn reject_invite(&self, call_id: &str, session_id: &str) {
        let cancel = SignalingMessage::Cancel {
            call_id: call_id.to_owned(),
            session_id: session_id.to_owned(),
        };
        self.send_message(&cancel).await;
    }

    /// End the active call. A no-op when no session exists, since ending an
    /// already-ended call is a common race.
    pub async fn end_call(&self) -> CallResult<()> {
        let ended = {
            let mut guard = self.session.write().await;
            match guard.take() {
                None => return Ok(()),
                Some(mut session) => {
                    // stored sessions are never terminal, so this holds
                    session.apply_transition(CallTransition::Ended).ok();
                    session
                }
            }
        };

        let bye = SignalingMessage::Bye {
            call_id: ended.id.clone(),
            session_id: ended.session_id.clone(),
        };
        self.send_message(&bye).await;
        self.adapter.teardown().await;
        self.notify_state(Some(ended)).await;
        Ok(())
    }

    /// Toggle hold. Flips `on_hold`, moves the status between `Answered`
    /// and `Hold`, and tells the peer with `info{hold, sdp}`. Two calls
    /// return the session to its original state.
    pub async fn toggle_hold(&self) -> CallResult<CallSession> {
        let local_sdp = self.adapter.local_description().await;
        let snapshot = {
            let mut guard = self.session.write().await;
            let session = guard.as_mut().ok_or(CallError::NoActiveSession)?;
            let transition = if session.on_hold {
                CallTransition::Resume
            } else {
                CallTransition::Hold
            };
            session.apply_transition(transition)?;
            session.on_hold = !session.on_hold;
            session.clone()
        };

        let info = SignalingMessage::Info {
            call_id: snapshot.id.clone(),
            session_id: snapshot.session_id.clone(),
            hold: Some(snapshot.on_hold),
            recording: None,
            dtmf: None,
            candidate: None,
            sdp: local_sdp,
        };
        self.send_message(&info).await;
        self.notify_state(Some(snapshot.clone())).await;
        Ok(snapshot)
    }

    /// Toggle the microphone. Purely local: flips `muted` and toggles the
    /// audio tracks on the local stream. No signaling message is sent.
    pub async fn toggle_mute(&self) -> CallResult<CallSession> {
        if self.session.read().await.is_none() {
            return Err(CallError::NoActiveSession);
        }
        let stream = self
            .adapter
            .local_stream()
            .await
            .ok_or(CallError::NotInitialized)?;

        let snapshot = {
            let mut guard = self.session.write().await;
            let session = guard.as_mut().ok_or(CallError::NoActiveSession)?;
            session.muted = !session.muted;
            session.clone()
        };
        stream.set_audio_enabled(!snapshot.muted);
        self.notify_state(Some(snapshot.clone())).await;
        Ok(snapshot)
    }

    /// Toggle recording and tell the peer with `info{recording}`.
    pub async fn toggle_recording(&self) -> CallResult<CallSession> {
        let snapshot = {
            let mut guard = self.session.write().await;
            let session = guard.as_mut().ok_or(CallError::NoActiveSession)?;
            session.recording = !session.recording;
            session.clone()
        };

        let info = SignalingMessage::Info {
            call_id: snapshot.id.clone(),
            session_id: snapshot.session_id.clone(),
            hold: None,
            recording: Some(snapshot.recording),
            dtmf: None,
            candidate: None,
            sdp: None,
        };
        self.send_message(&info).await;
        self.notify_state(Some(snapshot.clone())).await;
        Ok(snapshot)
    }

    /// Transfer the call named by `call_id` to another number. Sends
    /// `refer` and moves the session to `Transferring`; the session is
    /// expected to end with a subsequent `bye` from the far end.
    pub async fn transfer_call(&self, call_id: &str, number: &str) -> CallResult<CallSession> {
        let snapshot = {
            let mut guard = self.session.write().await;
            let session = guard.as_mut().ok_or(CallError::NoActiveSession)?;
            if !session.matches(call_id) {
                return Err(CallError::SessionMismatch {
                    expected: session.id.clone(),
                    got: call_id.to_owned(),
                });
            }
            session.apply_transition(CallTransition::TransferStarted)?;
            session.clone()
        };

        let refer = SignalingMessage::Refer {
            call_id: snapshot.id.clone(),
            session_id: snapshot.session_id.clone(),
            refer_to: number.to_owned(),
            referred_by: snapshot.from.clone(),
        };
        self.send_message(&refer).await;
        self.notify_state(Some(snapshot.clone())).await;
        Ok(snapshot)
    }

    /// Invite another party into the call. Sends a conference-tagged
    /// `invite` and moves the session to `Conferencing`.
    pub async fn add_to_conference(
        &self,
        call_id: &str,
        number: &str,
    ) -> CallResult<CallSession> {
        let local_sdp = self.adapter.local_description().await;
        let snapshot = {
            let mut guard = self.session.write().await;
            let session = guard.as_mut().ok_or(CallError::NoActiveSession)?;
            if !session.matches(call_id) {
                return Err(CallError::SessionMismatch {
                    expected: session.id.clone(),
                    got: call_id.to_owned(),
                });
            }
            session.apply_transition(CallTransition::ConferenceStarted)?;
            session.clone()
        };

        let invite = SignalingMessage::Invite {
            call_id: snapshot.id.clone(),
            session_id: snapshot.session_id.clone(),
            from: snapshot.from.clone(),
            to: number.to_owned(),
            sdp: local_sdp.unwrap_or_default(),
            conference: true,
        };
        self.send_message(&invite).await;
        self.notify_state(Some(snapshot.clone())).await;
        Ok(snapshot)
    }

    /// Send a DTMF digit with the configured delivery method.
    pub async fn send_dtmf(&self, digit: char) -> CallResult<()> {
        let (call_id, session_id) = {
            let guard = self.session.read().await;
            let session = guard.as_ref().ok_or(CallError::NoActiveSession)?;
            (session.id.clone(), session.session_id.clone())
        };
        if !matches!(digit, '0'..='9' | '*' | '#' | 'A'..='D') {
            return Err(CallError::InvalidDigit(digit));
        }
        let config = self.require_config().await?;

        let info = SignalingMessage::Info {
            call_id,
            session_id,
            hold: None,
            recording: None,
            dtmf: Some(DtmfPayload {
                digit,
                method: config.dtmf_method.as_str().to_owned(),
            }),
            candidate: None,
            sdp: None,
        };
        self.send_message(&info).await;
        Ok(())
    }

    /// Record the externally produced recording location on the session.
    pub async fn set_recording_url(&self, url: impl Into<String>) -> CallResult<CallSession> {
        let snapshot = {
            let mut guard = self.session.write().await;
            let session = guard.as_mut().ok_or(CallError::NoActiveSession)?;
            session.recording_url = Some(url.into());
            session.clone()
        };
        self.notify_state(Some(snapshot.clone())).await;
        Ok(snapshot)
    }

    /// Snapshot of the active session, if any.
    pub async fn current_call(&self) -> Option<CallSession> {
        self.session.read().await.clone()
    }

    pub async fn local_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.adapter.local_stream().await
    }

    pub async fn remote_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.adapter.remote_stream().await
    }

    /// Register the session-change subscriber, replacing any previous one.
    pub async fn set_state_handler(&self, handler: Arc<dyn SessionStateHandler>) {
        *self.state_handler.write().await = Some(handler);
    }

    /// Register the call-event subscriber, replacing any previous one.
    pub async fn set_event_handler(&self, handler: Arc<dyn CallEventHandler>) {
        *self.event_handler.write().await = Some(handler);
    }

    /// Release the peer connection and local stream, clear the session,
    /// configuration and handlers. Safe to call when already torn down.
    pub async fn destroy(&self) {
        self.adapter.release().await;
        *self.session.write().await = None;
        *self.config.write().await = None;
        *self.state_handler.write().await = None;
        *self.event_handler.write().await = None;
    }

    // -- internals shared with the dispatcher --

    pub(crate) async fn require_config(&self) -> CallResult<SessionConfig> {
        self.config
            .read()
            .await
            .clone()
            .ok_or(CallError::NotInitialized)
    }

    /// Move the active session to `Failed`, tear down media and clear it.
    pub(crate) async fn fail_active_session(&self) {
        let failed = {
            let mut guard = self.session.write().await;
            guard.take().map(|mut session| {
                session.apply_transition(CallTransition::Failed).ok();
                session
            })
        };
        if let Some(session) = failed {
            self.adapter.teardown().await;
            self.notify_state(Some(session)).await;
        }
    }

    pub(crate) async fn notify_state(&self, session: Option<CallSession>) {
        let handler = self.state_handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_session_changed(session).await;
        }
    }

    pub(crate) async fn notify_event(&self, event: CallEvent) {
        let handler = self.event_handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_call_event(event).await;
        }
    }

    pub(crate) fn observer(self: &Arc<Self>) -> Arc<dyn PeerConnectionObserver> {
        Arc::new(EngineObserver {
            engine: Arc::downgrade(self),
        })
    }

    /// Map adapter connectivity to state-machine transitions: `Connected`
    /// answers a connecting call, `Disconnected`/`Failed` are fatal,
    /// `Closed` is our own teardown and is ignored.
    pub(crate) async fn handle_connectivity_change(&self, state: ConnectivityState) {
        match state {
            ConnectivityState::Connected => {
                let snapshot = {
                    let mut guard = self.session.write().await;
                    match guard.as_mut() {
                        Some(session) => match session
                            .apply_transition(CallTransition::ConnectionEstablished)
                        {
                            Ok(()) => Some(session.clone()),
                            Err(err) => {
                                debug!("connectivity 'connected' ignored: {err}");
                                None
                            }
                        },
                        None => None,
                    }
                };
                if let Some(session) = snapshot {
                    self.notify_state(Some(session)).await;
                }
            }
            ConnectivityState::Disconnected | ConnectivityState::Failed => {
                warn!("media connectivity lost ({state:?})");
                self.fail_active_session().await;
            }
            ConnectivityState::Closed => {
                debug!("peer connection closed");
            }
        }
    }

    /// Relay a locally gathered ICE candidate to the peer, one
    /// fire-and-forget `info` per candidate.
    pub(crate) async fn handle_local_candidate(&self, candidate: IceCandidate) {
        let ids = {
            let guard = self.session.read().await;
            guard
                .as_ref()
                .map(|s| (s.id.clone(), s.session_id.clone()))
        };
        let Some((call_id, session_id)) = ids else {
            debug!("dropping local ICE candidate gathered without a session");
            return;
        };
        let info = SignalingMessage::Info {
            call_id,
            session_id,
            hold: None,
            recording: None,
            dtmf: None,
            candidate: Some(candidate),
            sdp: None,
        };
        self.send_message(&info).await;
    }

    pub(crate) async fn handle_remote_stream(&self, stream: Arc<dyn MediaStream>) {
        self.adapter.store_remote_stream(stream.clone()).await;
        self.notify_event(CallEvent::RemoteStream(stream)).await;
    }
}

/// Peer-connection observer forwarding into the engine. Holds a weak
/// reference; events arriving after the engine is gone are dropped.
struct EngineObserver {
    engine: Weak<CallEngine>,
}

#[async_trait::async_trait]
impl PeerConnectionObserver for EngineObserver {
    async fn on_connectivity_change(&self, state: ConnectivityState) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_connectivity_change(state).await;
        }
    }

    async fn on_ice_candidate(&self, candidate: IceCandidate) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_local_candidate(candidate).await;
        }
    }

    async fn on_remote_stream(&self, stream: Arc<dyn MediaStream>) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_remote_stream(stream).await;
        }
    }
}
