//! Signaling kind definitions.
//!
//! The wire protocol uses a small closed set of message kinds carried in the
//! `type` field of every signaling message. Each kind serves a specific
//! purpose in the call lifecycle.

use std::fmt;

/// Signaling message kinds for call control.
///
/// These are the values of the `type` discriminator on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingKind {
    /// Initial call offer. Carries the SDP offer; also reused with a
    /// conference tag to pull a new party into an ongoing call.
    Invite,

    /// Answer to an invite. Carries the SDP answer.
    Ack,

    /// Call ended. Can be sent by either party at any time.
    Bye,

    /// Call aborted / declined before or during setup.
    Cancel,

    /// Registration announcement. Informational, no call state attached.
    Register,

    /// Reachability probe. Answered with an `ok`.
    Options,

    /// Acknowledgement reply to an `options` probe.
    Ok,

    /// In-call signaling: hold flag, recording flag, DTMF digit or ICE
    /// candidate. The payloads are independent and may co-occur.
    Info,

    /// Call transfer request naming the transfer target.
    Refer,
}

impl SignalingKind {
    /// All kinds in wire-tag order.
    pub const ALL: [SignalingKind; 9] = [
        Self::Invite,
        Self::Ack,
        Self::Bye,
        Self::Cancel,
        Self::Register,
        Self::Options,
        Self::Ok,
        Self::Info,
        Self::Refer,
    ];

    /// The `type` value used on the wire.
    pub const fn tag_name(&self) -> &'static str {
        match self {
            Self::Invite => "invite",
            Self::Ack => "ack",
            Self::Bye => "bye",
            Self::Cancel => "cancel",
            Self::Register => "register",
            Self::Options => "options",
            Self::Ok => "ok",
            Self::Info => "info",
            Self::Refer => "refer",
        }
    }

    /// Parse from a wire tag (case-insensitive).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "invite" => Some(Self::Invite),
            "ack" => Some(Self::Ack),
            "bye" => Some(Self::Bye),
            "cancel" => Some(Self::Cancel),
            "register" => Some(Self::Register),
            "options" => Some(Self::Options),
            "ok" => Some(Self::Ok),
            "info" => Some(Self::Info),
            "refer" => Some(Self::Refer),
            _ => None,
        }
    }

    /// Whether an inbound message of this kind only applies when its call id
    /// matches the active session.
    pub const fn correlates_to_session(&self) -> bool {
        matches!(self, Self::Ack | Self::Bye | Self::Cancel | Self::Info)
    }

    /// Whether this kind terminates a correlated session.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Bye | Self::Cancel)
    }

    /// Whether receiving this kind may create a session (invite accept flow).
    pub const fn creates_session(&self) -> bool {
        matches!(self, Self::Invite)
    }
}

impl fmt::Display for SignalingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag_name())
    }
}
