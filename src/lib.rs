//! Client-side call-session controller.
//!
//! ringline negotiates and manages a single real-time voice/video session
//! with a remote signaling peer: it establishes the media transport,
//! exchanges signaling messages, and exposes call-control operations while
//! keeping an authoritative call state machine.
//!
//! # Architecture
//!
//! - [`SignalingKind`] / [`SignalingMessage`]: the closed set of wire
//!   message kinds and their JSON codec
//! - [`CallSession`], [`CallStatus`] & [`CallTransition`]: the session state
//!   machine tracking the one active call
//! - [`NegotiationAdapter`] over [`MediaPlatform`]: offer/answer/ICE against
//!   the platform's media primitives
//! - [`CallEngine`]: call-control operations (dial, accept, end, hold, mute,
//!   transfer, conference, DTMF, recording) and the inbound dispatcher
//!
//! The signaling connection and the media primitives are capabilities the
//! embedder provides ([`SignalingTransport`], [`MediaPlatform`]); inbound
//! message text is fed to [`CallEngine::handle_message`] from the embedder's
//! receive loop. The engine is deliberately single-session: exactly one
//! [`CallSession`] exists at a time.

pub mod config;
mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod media;
pub mod message;
pub mod signaling;
pub mod state;
pub mod transport;


pub use config::{DtmfMethod, IceServer, SessionConfig, TransportKind};
pub use engine::{CallEngine, CallOptions};
pub use error::{CallError, CallResult};
pub use events::{CallEvent, CallEventHandler, IncomingCall, SessionStateHandler};
pub use media::{
    ConnectivityState, IceCandidate, MediaConstraints, MediaPlatform, MediaStream,
    NegotiationAdapter, PeerConnection, PeerConnectionObserver,
};
pub use message::{DtmfPayload, SignalingMessage};
pub use signaling::SignalingKind;
pub use state::{CallDirection, CallSession, CallStatus, CallTransition, InvalidTransition};
pub use transport::SignalingTransport;
