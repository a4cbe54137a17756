use thiserror::Error;

/// Fatal failures of a session. None of these are retried.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Control link send/receive failure, link closure or a malformed payload
    #[error("control link error: {0}")]
    Transport(String),

    /// Creating or applying a local or remote session description failed
    #[error("session description error: {0}")]
    Description(String),

    /// Applying a remote connectivity candidate failed
    #[error("connectivity candidate error: {0}")]
    Candidate(String),

    /// The peer connection or its data channel could not be created
    #[error("peer connection error: {0}")]
    PeerConnection(String),

    /// Sending on the byte channel failed
    #[error("byte channel error: {0}")]
    Channel(String),

    /// Reading local input failed (end of stream is not an error)
    #[error("input error: {0}")]
    Input(#[from] std::io::Error),

    /// Writing a received message to local output failed
    #[error("output error: {0}")]
    Output(std::io::Error),
}

/// Control traffic that does not fit the current phase. Logged and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("unrecognized message type")]
    UnknownKind,

    #[error("`{kind}` is not expected in phase {phase}")]
    OutOfPhase { kind: &'static str, phase: String },

    #[error("role already assigned, ignoring `{0}`")]
    RoleAssigned(&'static str),

    #[error("unsupported registration request `{0}`")]
    UnsupportedRequest(String),

    #[error("`{kind}` from `{sender}` but the session peer is `{peer}`")]
    ForeignSender {
        kind: &'static str,
        sender: String,
        peer: String,
    },

    #[error("`{0}` is missing a required field")]
    MissingField(&'static str),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
