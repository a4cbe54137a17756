use crate::peer::types::PeerId;
use std::fmt;

/// Which side of the offer/answer exchange this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Unassigned,
    Initiator,
    Responder,
}

/// Session phases.
///
/// `Idle -> Requesting -> {Offering | Answering} -> Negotiating -> Connected`
/// and then one of the terminal phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Requesting,
    Offering,
    Answering,
    Negotiating,
    Connected,
    Closed,
    Failed,
    Disconnected,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Closed | Phase::Failed | Phase::Disconnected)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State of the single session attempt this process makes.
/// Mutated only by the negotiator.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub role: Role,
    pub peer: PeerId,
    pub local_description_ready: bool,
    pub remote_description_ready: bool,
    pub phase: Phase,
}

impl SessionState {
    pub fn peer_known(&self) -> bool {
        !self.peer.is_unknown()
    }

    /// Local candidates may go straight to the wire
    pub fn can_send_candidates(&self) -> bool {
        self.local_description_ready && self.peer_known()
    }
}
