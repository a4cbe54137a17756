pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::ClientConfig;
pub use error::{ProtocolViolation, SessionError};
pub use session::run;
