//! Control messages exchanged with the rendezvous server.
//!
//! One JSON object per message, discriminated by `type`. Fields the
//! server leaves out decode as empty strings.

use crate::peer::types::PeerId;
use serde::{Deserialize, Serialize};

/// Value of `request` in a registration response that makes us the initiator
pub const REQUEST_OFFER: &str = "offer";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Ask the server to pair us with a waiting party
    #[serde(rename = "signaling_request")]
    RegistrationRequest {
        #[serde(default)]
        target_id: PeerId,
        #[serde(default)]
        id: PeerId,
    },

    /// Pairing result: `request` is the role we should play, `target_id` the matched peer
    #[serde(rename = "signaling_response")]
    RegistrationResponse {
        #[serde(default)]
        target_id: PeerId,
        #[serde(default)]
        request: String,
        #[serde(default)]
        id: PeerId,
    },

    #[serde(rename = "offer")]
    SessionOffer {
        #[serde(default)]
        target_id: PeerId,
        #[serde(default)]
        offer: String,
        #[serde(default)]
        id: PeerId,
    },

    #[serde(rename = "answer")]
    SessionAnswer {
        #[serde(default)]
        target_id: PeerId,
        #[serde(default)]
        answer: String,
        #[serde(default)]
        id: PeerId,
    },

    #[serde(rename = "candidate")]
    ConnectivityCandidate {
        #[serde(default)]
        target_id: PeerId,
        #[serde(default)]
        candidate: String,
        #[serde(default)]
        id: PeerId,
    },

    /// Any `type` we do not understand
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::RegistrationRequest { .. } => "signaling_request",
            ControlMessage::RegistrationResponse { .. } => "signaling_response",
            ControlMessage::SessionOffer { .. } => "offer",
            ControlMessage::SessionAnswer { .. } => "answer",
            ControlMessage::ConnectivityCandidate { .. } => "candidate",
            ControlMessage::Unknown => "unknown",
        }
    }

    pub fn sender(&self) -> Option<&PeerId> {
        match self {
            ControlMessage::RegistrationRequest { id, .. }
            | ControlMessage::RegistrationResponse { id, .. }
            | ControlMessage::SessionOffer { id, .. }
            | ControlMessage::SessionAnswer { id, .. }
            | ControlMessage::ConnectivityCandidate { id, .. } => Some(id),
            ControlMessage::Unknown => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
