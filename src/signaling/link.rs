//! WebSocket link to the rendezvous server.

use crate::error::{Result, SessionError};
use crate::signaling::message::ControlMessage;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound half of the control channel, as seen by the negotiator
#[async_trait]
pub trait ControlSink: Send {
    async fn send(&mut self, message: &ControlMessage) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Reliable, ordered duplex channel carrying one JSON control message per text frame
pub struct ControlLink {
    sender: ControlSender,
    receiver: ControlReceiver,
}

impl ControlLink {
    pub async fn connect(url: &str) -> Result<Self> {
        debug!("Connecting to rendezvous server: {}", url);
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| SessionError::Transport(format!("connect to {url}: {e}")))?;
        debug!("Rendezvous link established");
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: WsStream) -> Self {
        let (sink, stream) = stream.split();
        Self {
            sender: ControlSender { sink },
            receiver: ControlReceiver { stream },
        }
    }

    pub async fn send(&mut self, message: &ControlMessage) -> Result<()> {
        self.sender.send(message).await
    }

    pub async fn receive(&mut self) -> Result<ControlMessage> {
        self.receiver.receive().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.sender.close().await
    }

    /// Separate the halves so receiving can run on its own task
    pub fn split(self) -> (ControlSender, ControlReceiver) {
        (self.sender, self.receiver)
    }
}

pub struct ControlSender {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl ControlSink for ControlSender {
    async fn send(&mut self, message: &ControlMessage) -> Result<()> {
        let json = message
            .to_json()
            .map_err(|e| SessionError::Transport(format!("encode {}: {e}", message.kind())))?;
        trace!("-> {}", json);
        self.sink
            .send(Message::Text(json))
            .await
            .map_err(|e| SessionError::Transport(format!("send {}: {e}", message.kind())))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| SessionError::Transport(format!("close: {e}")))
    }
}

pub struct ControlReceiver {
    stream: SplitStream<WsStream>,
}

impl ControlReceiver {
    /// Wait for the next control message. Closure and undecodable payloads are errors.
    pub async fn receive(&mut self) -> Result<ControlMessage> {
        loop {
            let frame = self
                .stream
                .next()
                .await
                .ok_or_else(|| SessionError::Transport("rendezvous link closed".into()))?
                .map_err(|e| SessionError::Transport(format!("receive: {e}")))?;

            match frame {
                Message::Text(text) => {
                    trace!("<- {}", text);
                    return ControlMessage::from_json(&text).map_err(|e| {
                        SessionError::Transport(format!("malformed control message: {e}"))
                    });
                }
                Message::Close(_) => {
                    return Err(SessionError::Transport(
                        "rendezvous server closed the link".into(),
                    ));
                }
                other => {
                    // pings are answered by tungstenite on the next write
                    debug!("Skipping non-text frame: {:?}", other);
                }
            }
        }
    }
}
