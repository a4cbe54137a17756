use crate::error::SessionError;
use crate::peer::data_channel::{ByteChannel, Frame, PumpExit};
use crate::signaling::ControlMessage;
use crate::utils::random_id;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity that tags every control message. Empty means "not known yet".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Fresh identity for this process; never reused across processes.
    pub fn generate() -> Self {
        Self(random_id())
    }

    pub fn unknown() -> Self {
        Self(String::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Opaque session description produced or consumed by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Peer connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// How a session ended without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Disconnected,
    Failed,
    Closed,
    /// Local input reached end of stream after the session connected
    InputClosed,
}

/// Events consumed by the negotiator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationEvent {
    Control(ControlMessage),
    CandidateDiscovered(String),
    ConnectionStateChanged(ConnectionState),
}

/// Everything the session driver reacts to, funnelled through one channel
pub enum SessionEvent {
    Negotiation(NegotiationEvent),
    /// The locally created byte channel is open and ready for the input pump
    ChannelOpen(Arc<dyn ByteChannel>),
    ChannelMessage(Frame),
    InputFinished(Result<PumpExit, SessionError>),
    LinkFailed(SessionError),
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Negotiation(event) => f.debug_tuple("Negotiation").field(event).finish(),
            SessionEvent::ChannelOpen(_) => f.write_str("ChannelOpen"),
            SessionEvent::ChannelMessage(frame) => {
                f.debug_tuple("ChannelMessage").field(frame).finish()
            }
            SessionEvent::InputFinished(result) => {
                f.debug_tuple("InputFinished").field(result).finish()
            }
            SessionEvent::LinkFailed(err) => f.debug_tuple("LinkFailed").field(err).finish(),
        }
    }
}

/// ICE server entry from the config file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}
