//! Media negotiation adapter.
//!
//! The platform's capture and peer-connection primitives are consumed
//! capabilities, not implemented here: the embedder provides
//! [`MediaPlatform`], [`MediaStream`] and [`PeerConnection`] implementations
//! (browser bindings, a native WebRTC stack, a test double). The
//! [`NegotiationAdapter`] owns the single local-stream / remote-stream /
//! peer-connection context, mirroring the one-session invariant.
//!
//! Candidate queueing before a remote description exists is the platform's
//! responsibility; the adapter passes candidates straight through.

use crate::config::IceServer;
use crate::error::{CallError, CallResult};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Connectivity states reported by the platform's peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Connected,
    Disconnected,
    Failed,
    /// Reported when the connection is torn down locally; not a failure.
    Closed,
}

/// Capture constraints for stream acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }

    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// An ICE candidate exchanged through `info` messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// The candidate line, e.g.
    /// `candidate:1 1 UDP 2130706431 192.168.1.1 8888 typ host`.
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }

    pub fn with_sdp_mid(mut self, sdp_mid: impl Into<String>) -> Self {
        self.sdp_mid = Some(sdp_mid.into());
        self
    }

    pub fn with_sdp_m_line_index(mut self, index: u16) -> Self {
        self.sdp_m_line_index = Some(index);
        self
    }
}

/// A captured or received media stream.
pub trait MediaStream: Send + Sync {
    /// Enable or disable the audio tracks. Used by mute, which is purely
    /// local and sends no signaling.
    fn set_audio_enabled(&self, enabled: bool);

    /// Release the underlying capture/track resources.
    fn close(&self);
}

/// Callbacks from the platform's peer connection into the engine.
#[async_trait::async_trait]
pub trait PeerConnectionObserver: Send + Sync {
    async fn on_connectivity_change(&self, state: ConnectivityState);

    /// A locally gathered ICE candidate, to be relayed to the peer.
    async fn on_ice_candidate(&self, candidate: IceCandidate);

    /// The remote media stream became available.
    async fn on_remote_stream(&self, stream: Arc<dyn MediaStream>);
}

/// The platform's peer-connection handle.
#[async_trait::async_trait]
pub trait PeerConnection: Send + Sync {
    /// Produce an SDP offer requesting the given media directions.
    async fn create_offer(&self, constraints: MediaConstraints) -> anyhow::Result<String>;
    async fn create_answer(&self) -> anyhow::Result<String>;
    async fn set_local_description(&self, sdp: &str) -> anyhow::Result<()>;
    async fn set_remote_description(&self, sdp: &str) -> anyhow::Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()>;
    async fn close(&self);
}

/// The platform media layer.
#[async_trait::async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Request a local capture stream. Failures are signalled, never retried
    /// here; the adapter decides on fallback.
    async fn acquire_stream(
        &self,
        constraints: MediaConstraints,
    ) -> anyhow::Result<Arc<dyn MediaStream>>;

    /// Construct a peer connection for the given ICE servers, wired to the
    /// observer for its whole lifetime.
    async fn create_peer_connection(
        &self,
        ice_servers: &[IceServer],
        observer: Arc<dyn PeerConnectionObserver>,
    ) -> anyhow::Result<Arc<dyn PeerConnection>>;
}

/// Owns the negotiation context: one local stream, one remote stream
/// reference, one peer connection. The local stream is owned (closed on
/// release); the remote stream is a reference and is only dropped.
pub struct NegotiationAdapter {
    platform: Arc<dyn MediaPlatform>,
    local_stream: Mutex<Option<Arc<dyn MediaStream>>>,
    remote_stream: Mutex<Option<Arc<dyn MediaStream>>>,
    connection: Mutex<Option<Arc<dyn PeerConnection>>>,
    /// Last SDP set as the local description, re-sent with hold toggles.
    local_sdp: Mutex<Option<String>>,
}

impl NegotiationAdapter {
    pub fn new(platform: Arc<dyn MediaPlatform>) -> Self {
        Self {
            platform,
            local_stream: Mutex::new(None),
            remote_stream: Mutex::new(None),
            connection: Mutex::new(None),
            local_sdp: Mutex::new(None),
        }
    }

    /// Acquire the local stream: reuse a caller-supplied one, or request a
    /// capture. When an audio+video request fails, falls back to an
    /// audio-only request before giving up, so a broken camera downgrades
    /// the call instead of killing it.
    pub async fn acquire(
        &self,
        existing: Option<Arc<dyn MediaStream>>,
        constraints: MediaConstraints,
    ) -> CallResult<Arc<dyn MediaStream>> {
        let stream = match existing {
            Some(stream) => stream,
            None => match self.platform.acquire_stream(constraints).await {
                Ok(stream) => stream,
                Err(err) if constraints.video => {
                    warn!("media capture with video failed, retrying audio-only: {err:#}");
                    self.platform
                        .acquire_stream(MediaConstraints::audio_only())
                        .await
                        .map_err(CallError::Negotiation)?
                }
                Err(err) => return Err(CallError::Negotiation(err)),
            },
        };
        *self.local_stream.lock().await = Some(stream.clone());
        Ok(stream)
    }

    pub async fn local_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.local_stream.lock().await.clone()
    }

    pub async fn remote_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.remote_stream.lock().await.clone()
    }

    pub(crate) async fn store_remote_stream(&self, stream: Arc<dyn MediaStream>) {
        *self.remote_stream.lock().await = Some(stream);
    }

    pub async fn has_local_stream(&self) -> bool {
        self.local_stream.lock().await.is_some()
    }

    /// Return the active peer connection, creating it on first use. At most
    /// one exists at a time.
    pub async fn ensure_connection(
        &self,
        ice_servers: &[IceServer],
        observer: Arc<dyn PeerConnectionObserver>,
    ) -> CallResult<Arc<dyn PeerConnection>> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }
        let connection = self
            .platform
            .create_peer_connection(ice_servers, observer)
            .await
            .map_err(CallError::Negotiation)?;
        *guard = Some(connection.clone());
        Ok(connection)
    }

    /// Produce an SDP offer and set it as the local description in one step.
    pub async fn create_offer(&self, constraints: MediaConstraints) -> CallResult<String> {
        let connection = self.active_connection().await?;
        let sdp = connection
            .create_offer(constraints)
            .await
            .map_err(CallError::Negotiation)?;
        connection
            .set_local_description(&sdp)
            .await
            .map_err(CallError::Negotiation)?;
        *self.local_sdp.lock().await = Some(sdp.clone());
        Ok(sdp)
    }

    /// Produce an SDP answer and set it as the local description in one step.
    /// The remote offer must already be applied.
    pub async fn create_answer(&self) -> CallResult<String> {
        let connection = self.active_connection().await?;
        let sdp = connection
            .create_answer()
            .await
            .map_err(CallError::Negotiation)?;
        connection
            .set_local_description(&sdp)
            .await
            .map_err(CallError::Negotiation)?;
        *self.local_sdp.lock().await = Some(sdp.clone());
        Ok(sdp)
    }

    pub async fn set_remote_description(&self, sdp: &str) -> CallResult<()> {
        let connection = self.active_connection().await?;
        connection
            .set_remote_description(sdp)
            .await
            .map_err(CallError::Negotiation)
    }

    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> CallResult<()> {
        let connection = self.active_connection().await?;
        connection
            .add_ice_candidate(candidate)
            .await
            .map_err(CallError::Negotiation)
    }

    /// The last local SDP, if negotiation produced one.
    pub async fn local_description(&self) -> Option<String> {
        self.local_sdp.lock().await.clone()
    }

    async fn active_connection(&self) -> CallResult<Arc<dyn PeerConnection>> {
        self.connection
            .lock()
            .await
            .clone()
            .ok_or(CallError::NotInitialized)
    }

    /// Close the peer connection and drop the remote stream reference. The
    /// local stream stays acquired so a new call can reuse it.
    pub async fn teardown(&self) {
        if let Some(connection) = self.connection.lock().await.take() {
            connection.close().await;
            debug!("peer connection closed");
        }
        *self.remote_stream.lock().await = None;
        *self.local_sdp.lock().await = None;
    }

    /// Full release: teardown plus closing the owned local stream.
    pub async fn release(&self) {
        self.teardown().await;
        if let Some(stream) = self.local_stream.lock().await.take() {
            stream.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeStream {
        closed: AtomicBool,
    }

    impl MediaStream for FakeStream {
        fn set_audio_enabled(&self, _enabled: bool) {}
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Platform whose camera is broken: audio+video requests fail, audio-only
    /// succeeds.
    struct BrokenCameraPlatform {
        attempts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MediaPlatform for BrokenCameraPlatform {
        async fn acquire_stream(
            &self,
            constraints: MediaConstraints,
        ) -> anyhow::Result<Arc<dyn MediaStream>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if constraints.video {
                anyhow::bail!("camera unavailable");
            }
            Ok(Arc::new(FakeStream {
                closed: AtomicBool::new(false),
            }))
        }

        async fn create_peer_connection(
            &self,
            _ice_servers: &[IceServer],
            _observer: Arc<dyn PeerConnectionObserver>,
        ) -> anyhow::Result<Arc<dyn PeerConnection>> {
            anyhow::bail!("not under test");
        }
    }

    #[tokio::test]
    async fn test_acquire_falls_back_to_audio_only() {
        let platform = Arc::new(BrokenCameraPlatform {
            attempts: AtomicUsize::new(0),
        });
        let adapter = NegotiationAdapter::new(platform.clone());

        adapter
            .acquire(None, MediaConstraints::audio_video())
            .await
            .unwrap();
        assert_eq!(platform.attempts.load(Ordering::SeqCst), 2);
        assert!(adapter.has_local_stream().await);
    }

    #[tokio::test]
    async fn test_acquire_audio_only_failure_propagates() {
        struct DeafPlatform;

        #[async_trait::async_trait]
        impl MediaPlatform for DeafPlatform {
            async fn acquire_stream(
                &self,
                _constraints: MediaConstraints,
            ) -> anyhow::Result<Arc<dyn MediaStream>> {
                anyhow::bail!("no capture devices");
            }

            async fn create_peer_connection(
                &self,
                _ice_servers: &[IceServer],
                _observer: Arc<dyn PeerConnectionObserver>,
            ) -> anyhow::Result<Arc<dyn PeerConnection>> {
                anyhow::bail!("not under test");
            }
        }

        let adapter = NegotiationAdapter::new(Arc::new(DeafPlatform));
        let err = adapter
            .acquire(None, MediaConstraints::audio_only())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CallError::Negotiation(_)));
        assert!(!adapter.has_local_stream().await);
    }

    #[tokio::test]
    async fn test_acquire_reuses_supplied_stream() {
        let platform = Arc::new(BrokenCameraPlatform {
            attempts: AtomicUsize::new(0),
        });
        let adapter = NegotiationAdapter::new(platform.clone());

        let supplied: Arc<dyn MediaStream> = Arc::new(FakeStream {
            closed: AtomicBool::new(false),
        });
        adapter
            .acquire(Some(supplied), MediaConstraints::audio_video())
            .await
            .unwrap();
        // no platform request when the caller shares a stream
        assert_eq!(platform.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_operations_without_connection_are_not_initialized() {
        let platform = Arc::new(BrokenCameraPlatform {
            attempts: AtomicUsize::new(0),
        });
        let adapter = NegotiationAdapter::new(platform);
        assert!(matches!(
            adapter
                .create_offer(MediaConstraints::audio_only())
                .await
                .unwrap_err(),
            CallError::NotInitialized
        ));
        assert!(matches!(
            adapter.set_remote_description("v=0").await.unwrap_err(),
            CallError::NotInitialized
        ));
    }

    #[test]
    fn test_ice_candidate_wire_shape() {
        let candidate = IceCandidate::new("candidate:1 1 UDP 2130706431 10.0.0.1 9 typ host")
            .with_sdp_mid("0")
            .with_sdp_m_line_index(0);
        let value = serde_json::to_value(&candidate).unwrap();
        assert_eq!(value["sdpMid"], "0");
        assert_eq!(value["sdpMLineIndex"], 0);
    }
}
