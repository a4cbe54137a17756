//! Rendezvous signalling: the control message protocol and the link that carries it.

pub mod link;
pub mod message;

pub use link::{ControlLink, ControlReceiver, ControlSender, ControlSink};
pub use message::{ControlMessage, REQUEST_OFFER};
