pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod negotiator;
pub mod state;
pub mod types;

pub use connection::{PeerTransport, RtcTransport};
pub use data_channel::{ByteChannel, Frame, PumpExit};
pub use ice::CandidateBuffer;
pub use negotiator::Negotiator;
pub use state::{Phase, Role, SessionState};
pub use types::{
    ConnectionState, NegotiationEvent, PeerId, SessionDescription, SessionEnd, SessionEvent,
    ServerConfig,
};
