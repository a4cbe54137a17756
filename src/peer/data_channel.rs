use crate::error::{Result, SessionError};
use crate::peer::types::SessionEvent;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

/// Label of the data channel both sides open
pub const CHANNEL_LABEL: &str = "chat";

/// One message on the byte channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    /// Text frame if the bytes are valid UTF-8, binary frame otherwise
    pub fn from_line(line: Vec<u8>) -> Self {
        match String::from_utf8(line) {
            Ok(text) => Frame::Text(text),
            Err(err) => Frame::Binary(Bytes::from(err.into_bytes())),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(data) => data,
        }
    }
}

impl From<DataChannelMessage> for Frame {
    fn from(msg: DataChannelMessage) -> Self {
        if msg.is_string {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => Frame::Text(text),
                Err(_) => Frame::Binary(msg.data),
            }
        } else {
            Frame::Binary(msg.data)
        }
    }
}

/// Byte channel of an established session
#[async_trait]
pub trait ByteChannel: Send + Sync {
    async fn send_text(&self, text: String) -> Result<()>;
    async fn send_binary(&self, data: Bytes) -> Result<()>;

    async fn send_frame(&self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Text(text) => self.send_text(text).await,
            Frame::Binary(data) => self.send_binary(data).await,
        }
    }
}

#[async_trait]
impl ByteChannel for RTCDataChannel {
    async fn send_text(&self, text: String) -> Result<()> {
        RTCDataChannel::send_text(self, text)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Channel(e.to_string()))
    }

    async fn send_binary(&self, data: Bytes) -> Result<()> {
        RTCDataChannel::send(self, &data)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Channel(e.to_string()))
    }
}

/// Why the input pump stopped without an input error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    EndOfInput,
    SendFailed(String),
}

/// Forward local input to the channel line by line until end of input.
///
/// A failed send ends the pump but is not an error for the session;
/// a failed read is.
pub async fn pump_input<R, C>(mut input: R, channel: &C) -> Result<PumpExit>
where
    R: AsyncBufRead + Unpin,
    C: ByteChannel + ?Sized,
{
    loop {
        let mut line = Vec::new();
        let n = input.read_until(b'\n', &mut line).await?;
        if n == 0 {
            info!("Reached end of input");
            return Ok(PumpExit::EndOfInput);
        }

        let frame = Frame::from_line(line);
        let len = frame.as_bytes().len();
        let binary = matches!(frame, Frame::Binary(_));
        if let Err(e) = channel.send_frame(frame).await {
            warn!("Send on byte channel failed, stopping input: {}", e);
            return Ok(PumpExit::SendFailed(e.to_string()));
        }
        debug!(len, binary, "sent line");
    }
}

/// Write an inbound frame to local output unchanged
pub async fn write_frame<W>(output: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    output
        .write_all(frame.as_bytes())
        .await
        .map_err(SessionError::Output)?;
    output.flush().await.map_err(SessionError::Output)
}

/// Wire a data channel into the session event stream.
///
/// Inbound messages become `ChannelMessage` events. When `announce_open` is
/// set, the channel is also handed to the session once it opens so local input
/// can be pumped into it.
pub fn attach_dc(dc: &Arc<RTCDataChannel>, events: UnboundedSender<SessionEvent>, announce_open: bool) {
    let label = dc.label().to_string();

    dc.on_open(Box::new({
        let dc = dc.clone();
        let events = events.clone();
        let label = label.clone();
        move || {
            info!("Data channel '{}' opened", label);
            if announce_open {
                let channel: Arc<dyn ByteChannel> = dc;
                let _ = events.send(SessionEvent::ChannelOpen(channel));
            }
            Box::pin(async {})
        }
    }));

    dc.on_message(Box::new({
        let events = events.clone();
        move |msg: DataChannelMessage| {
            debug!("Received message, length: {}", msg.data.len());
            if events.send(SessionEvent::ChannelMessage(Frame::from(msg))).is_err() {
                debug!("Session gone, dropping inbound message");
            }
            Box::pin(async {})
        }
    }));

    dc.on_close(Box::new(move || {
        info!("Data channel '{}' closed", label);
        Box::pin(async {})
    }));
}
