//! Top-level driver for one session.
//!
//! Owns the negotiator and funnels every asynchronous source (control link,
//! transport callbacks, input pump) through a single event channel.

use crate::config::ClientConfig;
use crate::error::{Result, SessionError};
use crate::peer::connection::{PeerTransport, RtcTransport};
use crate::peer::data_channel::{pump_input, write_frame, ByteChannel, PumpExit};
use crate::peer::negotiator::Negotiator;
use crate::peer::state::Phase;
use crate::peer::types::{NegotiationEvent, PeerId, SessionEnd, SessionEvent};
use crate::signaling::{ControlLink, ControlReceiver, ControlSink};
use std::sync::Arc;
use tokio::io::{AsyncWrite, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Run a session to completion against the configured rendezvous server
pub async fn run(config: ClientConfig) -> Result<SessionEnd> {
    let local_id = PeerId::generate();
    info!(id = %local_id, server = %config.server_ip, "Starting session");

    let link = ControlLink::connect(&config.server_ip).await?;
    let (sender, receiver) = link.split();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = match RtcTransport::new(config.ice_servers.as_deref(), events_tx.clone()).await {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            let mut sender = sender;
            let _ = sender.close().await;
            return Err(e);
        }
    };

    let reader = spawn_control_reader(receiver, events_tx.clone());
    let negotiator = Negotiator::new(local_id, transport.clone(), sender);

    let mut session = Session::new(negotiator, events_tx);
    let outcome = session.drive(events_rx, tokio::io::stdout()).await;

    session.shutdown().await;
    reader.abort();
    if let Err(e) = transport.close().await {
        debug!("Peer connection close: {}", e);
    }

    match &outcome {
        Ok(end) => info!(?end, "Session finished"),
        Err(e) => error!("Session failed: {}", e),
    }
    outcome
}

fn spawn_control_reader(
    mut receiver: ControlReceiver,
    events: UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.receive().await {
                Ok(message) => {
                    let event = SessionEvent::Negotiation(NegotiationEvent::Control(message));
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = events.send(SessionEvent::LinkFailed(e));
                    break;
                }
            }
        }
    })
}

/// Event loop state: the negotiator plus the input pump, once started
pub struct Session<T: ?Sized, L> {
    negotiator: Negotiator<T, L>,
    events_tx: UnboundedSender<SessionEvent>,
    pump: Option<JoinHandle<()>>,
}

impl<T, L> Session<T, L>
where
    T: PeerTransport + ?Sized,
    L: ControlSink,
{
    pub fn new(negotiator: Negotiator<T, L>, events_tx: UnboundedSender<SessionEvent>) -> Self {
        Self {
            negotiator,
            events_tx,
            pump: None,
        }
    }

    pub fn negotiator(&self) -> &Negotiator<T, L> {
        &self.negotiator
    }

    /// Register with the rendezvous server, then process events until the
    /// session ends or something fatal happens.
    pub async fn drive<W>(
        &mut self,
        mut events: UnboundedReceiver<SessionEvent>,
        mut output: W,
    ) -> Result<SessionEnd>
    where
        W: AsyncWrite + Unpin,
    {
        self.negotiator.start().await?;

        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Negotiation(event) => {
                    if let Some(end) = self.negotiator.handle(event).await? {
                        return Ok(end);
                    }
                }
                SessionEvent::ChannelOpen(channel) => self.start_pump(channel),
                SessionEvent::ChannelMessage(frame) => write_frame(&mut output, &frame).await?,
                SessionEvent::InputFinished(Ok(PumpExit::EndOfInput)) => {
                    if self.negotiator.phase() == Phase::Connected {
                        return Ok(SessionEnd::InputClosed);
                    }
                    debug!(phase = %self.negotiator.phase(), "Input ended before the session connected");
                }
                SessionEvent::InputFinished(Ok(PumpExit::SendFailed(reason))) => {
                    warn!("Input pump stopped: {}", reason);
                }
                SessionEvent::InputFinished(Err(e)) => return Err(e),
                SessionEvent::LinkFailed(e) => return Err(e),
            }
        }

        Err(SessionError::Transport("event channel closed".into()))
    }

    fn start_pump(&mut self, channel: Arc<dyn ByteChannel>) {
        if self.pump.is_some() {
            debug!("Input pump already running");
            return;
        }
        info!("Byte channel open, forwarding input");
        let events = self.events_tx.clone();
        self.pump = Some(tokio::spawn(async move {
            let input = BufReader::new(tokio::io::stdin());
            let result = pump_input(input, channel.as_ref()).await;
            let _ = events.send(SessionEvent::InputFinished(result));
        }));
    }

    /// Stop the input pump and close the control link
    pub async fn shutdown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Err(e) = self.negotiator.close_link().await {
            debug!("Control link close: {}", e);
        }
    }
}
