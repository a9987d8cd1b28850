//! Engine error types.

use crate::state::InvalidTransition;
use thiserror::Error;

/// Result type for call-engine operations.
pub type CallResult<T> = Result<T, CallError>;

/// Errors surfaced by call-control operations.
///
/// Inbound message handling never produces these: a message that does not
/// correlate to the active session is ignored defensively, since the
/// transport may race with local teardown.
#[derive(Debug, Error)]
pub enum CallError {
    /// An operation needing the media layer ran before `initialize` succeeded.
    #[error("engine not initialized")]
    NotInitialized,

    /// A control operation was invoked while no session exists.
    #[error("no active call session")]
    NoActiveSession,

    /// The caller named a call id other than the active session's.
    #[error("call id mismatch: expected {expected}, got {got}")]
    SessionMismatch { expected: String, got: String },

    /// A new session was requested while one is already active.
    #[error("a call session is already active: {0}")]
    SessionActive(String),

    /// Stream acquisition or SDP negotiation failed in the platform layer.
    #[error("media negotiation failed: {0}")]
    Negotiation(anyhow::Error),

    #[error("invalid state transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("invalid DTMF digit: {0:?}")]
    InvalidDigit(char),

    #[error("malformed signaling message: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CallError {
    /// Wrap a platform-layer failure.
    pub fn negotiation(err: impl Into<anyhow::Error>) -> Self {
        Self::Negotiation(err.into())
    }

    /// Whether the error is the caller's misuse of the API rather than a
    /// platform failure.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::NoActiveSession
                | Self::SessionMismatch { .. }
                | Self::SessionActive(_)
                | Self::InvalidDigit(_)
        )
    }
}
