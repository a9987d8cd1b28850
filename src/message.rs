//! Signaling message codec.
//!
//! Messages are JSON objects with a lowercase `type` discriminator, a
//! `callId`, and camelCase kind-specific fields. The codec is purely
//! structural: it owns no state and every message is built fresh per send.
//!
//! There is no version field, no sequence number and no delivery
//! acknowledgement beyond the protocol's own `ack`/`ok` messages.

use crate::error::CallError;
use crate::media::IceCandidate;
use crate::signaling::SignalingKind;
use serde::{Deserialize, Serialize};

/// DTMF payload carried inside an `info` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtmfPayload {
    pub digit: char,
    /// Delivery method, e.g. "rfc2833" or "info".
    pub method: String,
}

/// A signaling message exchanged with the remote peer.
///
/// Closed union over the wire kinds; adding a kind means adding a variant
/// and the dispatcher match arm stops compiling until it is handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// Call offer. `conference` marks invites that pull a party into an
    /// ongoing call.
    #[serde(rename_all = "camelCase")]
    Invite {
        call_id: String,
        session_id: String,
        from: String,
        to: String,
        sdp: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        conference: bool,
    },

    /// Answer to an invite, carrying the SDP answer.
    #[serde(rename_all = "camelCase")]
    Ack {
        call_id: String,
        session_id: String,
        from: String,
        to: String,
        sdp: String,
    },

    /// Call teardown.
    #[serde(rename_all = "camelCase")]
    Bye { call_id: String, session_id: String },

    /// Call abort / decline.
    #[serde(rename_all = "camelCase")]
    Cancel { call_id: String, session_id: String },

    /// Registration announcement for the local address.
    #[serde(rename_all = "camelCase")]
    Register {
        call_id: String,
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires: Option<u32>,
    },

    /// Reachability probe.
    #[serde(rename_all = "camelCase")]
    Options {
        call_id: String,
        from: String,
        to: String,
    },

    /// Acknowledgement reply to an `options` probe.
    #[serde(rename_all = "camelCase")]
    Ok { call_id: String, to: String },

    /// In-call signaling. Every payload field is optional and independent;
    /// any combination may be present in one message.
    #[serde(rename_all = "camelCase")]
    Info {
        call_id: String,
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hold: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recording: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dtmf: Option<DtmfPayload>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidate: Option<IceCandidate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sdp: Option<String>,
    },

    /// Call transfer request.
    #[serde(rename_all = "camelCase")]
    Refer {
        call_id: String,
        session_id: String,
        refer_to: String,
        referred_by: String,
    },
}

impl SignalingMessage {
    /// The kind of this message.
    pub fn kind(&self) -> SignalingKind {
        match self {
            Self::Invite { .. } => SignalingKind::Invite,
            Self::Ack { .. } => SignalingKind::Ack,
            Self::Bye { .. } => SignalingKind::Bye,
            Self::Cancel { .. } => SignalingKind::Cancel,
            Self::Register { .. } => SignalingKind::Register,
            Self::Options { .. } => SignalingKind::Options,
            Self::Ok { .. } => SignalingKind::Ok,
            Self::Info { .. } => SignalingKind::Info,
            Self::Refer { .. } => SignalingKind::Refer,
        }
    }

    /// The call id this message correlates to.
    pub fn call_id(&self) -> &str {
        match self {
            Self::Invite { call_id, .. }
            | Self::Ack { call_id, .. }
            | Self::Bye { call_id, .. }
            | Self::Cancel { call_id, .. }
            | Self::Register { call_id, .. }
            | Self::Options { call_id, .. }
            | Self::Ok { call_id, .. }
            | Self::Info { call_id, .. }
            | Self::Refer { call_id, .. } => call_id,
        }
    }

    /// Serialize to the JSON wire form.
    pub fn encode(&self) -> Result<String, CallError> {
        serde_json::to_string(self).map_err(CallError::Decode)
    }

    /// Parse a message from the JSON wire form.
    pub fn decode(raw: &str) -> Result<Self, CallError> {
        serde_json::from_str(raw).map_err(CallError::Decode)
    }
}
