use crate::error::{Result, SessionError};
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::peer::data_channel::{attach_dc, CHANNEL_LABEL};
use crate::peer::types::{
    ConnectionState, NegotiationEvent, SdpKind, ServerConfig, SessionDescription, SessionEvent,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::{
    api::APIBuilder,
    data_channel::RTCDataChannel,
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        RTCPeerConnection,
    },
};

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// What the negotiator needs from the peer-to-peer transport
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn add_remote_candidate(&self, candidate: String) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => {
                ConnectionState::New
            }
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

/// WebRTC peer connection with one locally created data channel.
///
/// Every callback of the connection is turned into a `SessionEvent` on `events`.
pub struct RtcTransport {
    pc: Arc<RTCPeerConnection>,
    channel: Arc<RTCDataChannel>,
}

impl RtcTransport {
    pub async fn new(
        ice_servers: Option<&[ServerConfig]>,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let api = APIBuilder::new().build();
        let pc = Arc::new(
            api.new_peer_connection(rtc_config(ice_servers))
                .await
                .map_err(|e| SessionError::PeerConnection(e.to_string()))?,
        );
        info!("Created peer connection");

        let candidate_events = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(c) = cand else {
                    debug!("ICE candidate gathering completed");
                    return;
                };
                dump_candidate("LOCAL", &c);
                match c.to_json() {
                    Ok(init) => {
                        let event = NegotiationEvent::CandidateDiscovered(init.candidate);
                        let _ = events.send(SessionEvent::Negotiation(event));
                    }
                    Err(e) => warn!("Could not serialize local candidate: {}", e),
                }
            })
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {:?}", state);
            Box::pin(async {})
        }));

        let state_events = events.clone();
        let pc_stats = Arc::downgrade(&pc);
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            info!("Peer connection state changed to: {}", st);
            if matches!(
                st,
                RTCPeerConnectionState::Connected | RTCPeerConnectionState::Failed
            ) {
                if let Some(pc) = pc_stats.upgrade() {
                    tokio::spawn(async move {
                        dump_selected_pair(&pc, &st.to_string()).await;
                    });
                }
            }
            let event = NegotiationEvent::ConnectionStateChanged(st.into());
            let _ = state_events.send(SessionEvent::Negotiation(event));
            Box::pin(async {})
        }));

        let remote_events = events.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            info!("New data channel: {}", dc.label());
            if dc.label() == CHANNEL_LABEL {
                attach_dc(&dc, remote_events.clone(), false);
            } else {
                warn!("Unknown data channel: {}", dc.label());
            }
            Box::pin(async {})
        }));

        let channel = pc
            .create_data_channel(CHANNEL_LABEL, None)
            .await
            .map_err(|e| SessionError::PeerConnection(e.to_string()))?;
        attach_dc(&channel, events, true);
        info!("Created data channel '{}'", CHANNEL_LABEL);

        Ok(Self { pc, channel })
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| SessionError::Description(format!("create offer: {e}")))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| SessionError::Description(format!("create answer: {e}")))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| SessionError::Description(format!("set local description: {e}")))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| SessionError::Description(format!("set remote description: {e}")))
    }

    async fn add_remote_candidate(&self, candidate: String) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate,
            ..Default::default()
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| SessionError::Candidate(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.channel.close().await {
            debug!("Data channel close: {}", e);
        }
        self.pc
            .close()
            .await
            .map_err(|e| SessionError::PeerConnection(format!("close: {e}")))
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
    }
    .map_err(|e| SessionError::Description(format!("parse description: {e}")))
}

/// Peer connection config; the configured ICE servers replace the default STUN server
fn rtc_config(custom_servers: Option<&[ServerConfig]>) -> RTCConfiguration {
    let ice_servers = match custom_servers {
        Some(servers) if !servers.is_empty() => get_user_ice_servers(servers),
        _ => vec![RTCIceServer {
            urls: vec![DEFAULT_STUN_SERVER.into()],
            ..Default::default()
        }],
    };

    RTCConfiguration {
        ice_servers,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Url of a configured server, with `stun:`/`turn:` prepended when the config omits it
fn ice_url(config: &ServerConfig) -> String {
    let has_scheme = ["stun:", "turn:"]
        .iter()
        .any(|scheme| config.url.starts_with(*scheme));
    match config.r#type.as_str() {
        _ if has_scheme => config.url.clone(),
        "turn" => format!("turn:{}", config.url),
        _ => format!("stun:{}", config.url),
    }
}

pub fn get_user_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![ice_url(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}
