//! Session configuration.
//!
//! A [`SessionConfig`] is supplied by the embedder's settings store at
//! initialization time and is immutable for the lifetime of one
//! initialization; re-initializing replaces it wholesale.

use serde::{Deserialize, Serialize};

/// Transport the signaling channel runs over. The engine never opens the
/// connection itself; the value is informational for the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Websocket,
    Tcp,
    Udp,
}

/// How DTMF digits are delivered to the far end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtmfMethod {
    /// RTP telephone-event payload (RFC 2833 / 4733).
    #[default]
    Rfc2833,
    /// Signaling-channel `info` message only.
    Info,
    /// In-band audio tones.
    Inband,
}

impl DtmfMethod {
    /// Wire string carried in the DTMF info payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rfc2833 => "rfc2833",
            Self::Info => "info",
            Self::Inband => "inband",
        }
    }
}

/// A STUN or TURN server used for ICE gathering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URL, e.g. `stun:stun.example.com:3478`.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// Connection and media policy for one initialization of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Signaling server endpoint.
    pub server_url: String,
    /// Account credential for the signaling server, if it requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// The local signaling address; inbound sessions use it as their `to`.
    pub local_address: String,
    #[serde(default)]
    pub transport: TransportKind,
    /// STUN/TURN servers handed to the platform when building a peer
    /// connection.
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
    /// Master switch; `initialize` reports false when disabled.
    #[serde(default = "default_true")]
    pub signaling_enabled: bool,
    /// Accept inbound invites without asking the embedder.
    #[serde(default)]
    pub auto_answer: bool,
    #[serde(default)]
    pub dtmf_method: DtmfMethod,
}

fn default_true() -> bool {
    true
}

impl SessionConfig {
    /// Minimal config for a signaling endpoint and local address.
    pub fn new(server_url: impl Into<String>, local_address: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            credential: None,
            local_address: local_address.into(),
            transport: TransportKind::default(),
            ice_servers: Vec::new(),
            signaling_enabled: true,
            auto_answer: false,
            dtmf_method: DtmfMethod::default(),
        }
    }

    /// Whether the engine can initialize from this config.
    pub fn is_usable(&self) -> bool {
        self.signaling_enabled && !self.server_url.is_empty() && !self.local_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_requires_endpoint_and_address() {
        let config = SessionConfig::new("wss://sig.example.com", "+15559990000");
        assert!(config.is_usable());

        let mut disabled = config.clone();
        disabled.signaling_enabled = false;
        assert!(!disabled.is_usable());

        let mut no_endpoint = config.clone();
        no_endpoint.server_url.clear();
        assert!(!no_endpoint.is_usable());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let raw = r#"{"serverUrl":"wss://sig.example.com","localAddress":"+15559990000"}"#;
        let config: SessionConfig = serde_json::from_str(raw).unwrap();
        assert!(config.signaling_enabled);
        assert!(!config.auto_answer);
        assert_eq!(config.dtmf_method, DtmfMethod::Rfc2833);
        assert_eq!(config.transport, TransportKind::Websocket);
        assert!(config.ice_servers.is_empty());
    }

    #[test]
    fn test_ice_server_constructors() {
        let stun = IceServer::stun("stun:stun.example.com:3478");
        assert!(stun.username.is_none());

        let turn = IceServer::turn("turn:turn.example.com:3478", "user", "pass");
        assert_eq!(turn.username.as_deref(), Some("user"));
        assert_eq!(turn.credential.as_deref(), Some("pass"));
    }
}
