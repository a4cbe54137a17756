//! Session negotiation state machine.
//!
//! Turns the unordered mix of inbound control messages and transport callbacks
//! into exactly one offer/answer exchange. Events are handled one at a time by
//! the task that owns the negotiator, so a candidate discovered while the local
//! description is being set is processed after the flush: it is either in the
//! flushed batch or sent on its own, never both.

use crate::error::{ProtocolViolation, Result};
use crate::peer::connection::PeerTransport;
use crate::peer::ice::CandidateBuffer;
use crate::peer::state::{Phase, Role, SessionState};
use crate::peer::types::{
    ConnectionState, NegotiationEvent, PeerId, SessionDescription, SessionEnd,
};
use crate::signaling::{ControlMessage, ControlSink, REQUEST_OFFER};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Negotiator<T: ?Sized, L> {
    local_id: PeerId,
    transport: Arc<T>,
    link: L,
    state: SessionState,
    /// Local candidates waiting for the local description and the peer
    local_candidates: CandidateBuffer,
    /// Remote candidates that arrived before the remote description
    remote_candidates: CandidateBuffer,
}

impl<T, L> Negotiator<T, L>
where
    T: PeerTransport + ?Sized,
    L: ControlSink,
{
    pub fn new(local_id: PeerId, transport: Arc<T>, link: L) -> Self {
        Self {
            local_id,
            transport,
            link,
            state: SessionState::default(),
            local_candidates: CandidateBuffer::new(),
            remote_candidates: CandidateBuffer::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn role(&self) -> Role {
        self.state.role
    }

    pub fn peer(&self) -> Option<&PeerId> {
        self.state.peer_known().then_some(&self.state.peer)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Ask the rendezvous server for a partner. `Idle -> Requesting`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state.phase != Phase::Idle {
            return Ok(());
        }
        self.link
            .send(&ControlMessage::RegistrationRequest {
                target_id: PeerId::unknown(),
                id: self.local_id.clone(),
            })
            .await?;
        self.state.phase = Phase::Requesting;
        info!(id = %self.local_id, "Sent signaling request");
        Ok(())
    }

    /// Process one event. Returns how the session ended once a terminal
    /// connection state is reported.
    pub async fn handle(&mut self, event: NegotiationEvent) -> Result<Option<SessionEnd>> {
        if self.state.phase.is_terminal() {
            debug!(phase = %self.state.phase, "Session over, dropping {:?}", event);
            return Ok(None);
        }

        match event {
            NegotiationEvent::Control(message) => {
                self.on_control(message).await?;
                Ok(None)
            }
            NegotiationEvent::CandidateDiscovered(candidate) => {
                self.on_local_candidate(candidate).await?;
                Ok(None)
            }
            NegotiationEvent::ConnectionStateChanged(state) => Ok(self.on_connection_state(state)),
        }
    }

    /// Close the control link after the session is over
    pub async fn close_link(&mut self) -> Result<()> {
        self.link.close().await
    }

    async fn on_control(&mut self, message: ControlMessage) -> Result<()> {
        debug!(
            kind = message.kind(),
            from = ?message.sender(),
            phase = %self.state.phase,
            "Control message"
        );
        match message {
            ControlMessage::RegistrationResponse {
                target_id, request, ..
            } => match self.check_registration(&request, &target_id) {
                Ok(()) => self.begin_offer(target_id).await,
                Err(v) => self.ignore(v),
            },
            ControlMessage::SessionOffer { offer, id, .. } => match self.check_offer(&id, &offer) {
                Ok(()) => self.answer_offer(id, offer).await,
                Err(v) => self.ignore(v),
            },
            ControlMessage::SessionAnswer { answer, id, .. } => {
                match self.check_answer(&id, &answer) {
                    Ok(()) => self.accept_answer(answer).await,
                    Err(v) => self.ignore(v),
                }
            }
            ControlMessage::ConnectivityCandidate { candidate, id, .. } => {
                match self.check_remote_candidate(&id, &candidate) {
                    Ok(()) => self.on_remote_candidate(candidate).await,
                    Err(v) => self.ignore(v),
                }
            }
            ControlMessage::RegistrationRequest { .. } => {
                self.ignore(self.out_of_phase("signaling_request"))
            }
            ControlMessage::Unknown => self.ignore(ProtocolViolation::UnknownKind),
        }
    }

    fn ignore(&self, violation: ProtocolViolation) -> Result<()> {
        warn!(phase = %self.state.phase, "Ignoring control message: {}", violation);
        Ok(())
    }

    fn out_of_phase(&self, kind: &'static str) -> ProtocolViolation {
        ProtocolViolation::OutOfPhase {
            kind,
            phase: self.state.phase.to_string(),
        }
    }

    fn check_registration(&self, request: &str, target: &PeerId) -> Result<(), ProtocolViolation> {
        if self.state.role != Role::Unassigned {
            return Err(ProtocolViolation::RoleAssigned("signaling_response"));
        }
        if self.state.phase != Phase::Requesting {
            return Err(self.out_of_phase("signaling_response"));
        }
        if request != REQUEST_OFFER {
            return Err(ProtocolViolation::UnsupportedRequest(request.to_string()));
        }
        if target.is_unknown() {
            return Err(ProtocolViolation::MissingField("signaling_response"));
        }
        Ok(())
    }

    fn check_offer(&self, sender: &PeerId, offer: &str) -> Result<(), ProtocolViolation> {
        if self.state.role != Role::Unassigned {
            return Err(ProtocolViolation::RoleAssigned("offer"));
        }
        if !matches!(self.state.phase, Phase::Idle | Phase::Requesting) {
            return Err(self.out_of_phase("offer"));
        }
        if sender.is_unknown() || offer.is_empty() {
            return Err(ProtocolViolation::MissingField("offer"));
        }
        Ok(())
    }

    fn check_answer(&self, sender: &PeerId, answer: &str) -> Result<(), ProtocolViolation> {
        if self.state.phase != Phase::Offering {
            return Err(self.out_of_phase("answer"));
        }
        if answer.is_empty() {
            return Err(ProtocolViolation::MissingField("answer"));
        }
        self.check_sender("answer", sender)
    }

    fn check_remote_candidate(&self, sender: &PeerId, candidate: &str) -> Result<(), ProtocolViolation> {
        if !self.state.peer_known() {
            return Err(self.out_of_phase("candidate"));
        }
        if candidate.is_empty() {
            return Err(ProtocolViolation::MissingField("candidate"));
        }
        self.check_sender("candidate", sender)
    }

    fn check_sender(&self, kind: &'static str, sender: &PeerId) -> Result<(), ProtocolViolation> {
        if *sender != self.state.peer {
            return Err(ProtocolViolation::ForeignSender {
                kind,
                sender: sender.to_string(),
                peer: self.state.peer.to_string(),
            });
        }
        Ok(())
    }

    /// Initiator: `Requesting -> Offering`
    async fn begin_offer(&mut self, peer: PeerId) -> Result<()> {
        self.state.role = Role::Initiator;
        self.state.peer = peer;
        info!(peer = %self.state.peer, "Matched as initiator");

        let offer = self.transport.create_offer().await?;
        self.transport.set_local_description(offer.clone()).await?;
        self.state.local_description_ready = true;

        self.link
            .send(&ControlMessage::SessionOffer {
                target_id: self.state.peer.clone(),
                offer: offer.sdp,
                id: self.local_id.clone(),
            })
            .await?;
        self.state.phase = Phase::Offering;
        info!("Sent offer");

        self.flush_local_candidates().await
    }

    /// Responder: `Requesting -> Answering -> Negotiating`
    async fn answer_offer(&mut self, peer: PeerId, offer: String) -> Result<()> {
        self.state.role = Role::Responder;
        self.state.peer = peer;
        self.state.phase = Phase::Answering;
        info!(peer = %self.state.peer, "Received offer, answering");

        self.transport
            .set_remote_description(SessionDescription::offer(offer))
            .await?;
        self.state.remote_description_ready = true;
        self.apply_queued_remote_candidates().await?;

        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer.clone()).await?;
        self.state.local_description_ready = true;

        self.link
            .send(&ControlMessage::SessionAnswer {
                target_id: self.state.peer.clone(),
                answer: answer.sdp,
                id: self.local_id.clone(),
            })
            .await?;
        info!("Sent answer");

        self.flush_local_candidates().await?;
        self.state.phase = Phase::Negotiating;
        Ok(())
    }

    /// Initiator: `Offering -> Negotiating`
    async fn accept_answer(&mut self, answer: String) -> Result<()> {
        self.transport
            .set_remote_description(SessionDescription::answer(answer))
            .await?;
        self.state.remote_description_ready = true;
        self.state.phase = Phase::Negotiating;
        info!("Answer applied");

        self.apply_queued_remote_candidates().await
    }

    async fn on_remote_candidate(&mut self, candidate: String) -> Result<()> {
        if !self.state.remote_description_ready {
            self.remote_candidates.append(candidate);
            return Ok(());
        }
        self.transport.add_remote_candidate(candidate).await?;
        debug!("Added remote ICE candidate");
        Ok(())
    }

    async fn apply_queued_remote_candidates(&mut self) -> Result<()> {
        for candidate in self.remote_candidates.flush() {
            self.transport.add_remote_candidate(candidate).await?;
            debug!("Applied queued remote ICE candidate");
        }
        Ok(())
    }

    async fn on_local_candidate(&mut self, candidate: String) -> Result<()> {
        if !self.state.can_send_candidates() {
            self.local_candidates.append(candidate);
            return Ok(());
        }
        self.send_candidate(candidate).await
    }

    /// Single flush point: runs once, right after the description went out
    async fn flush_local_candidates(&mut self) -> Result<()> {
        let pending = self.local_candidates.flush();
        if !pending.is_empty() {
            info!(count = pending.len(), peer = %self.state.peer, "Flushing buffered ICE candidates");
        }
        for candidate in pending {
            self.send_candidate(candidate).await?;
        }
        Ok(())
    }

    async fn send_candidate(&mut self, candidate: String) -> Result<()> {
        self.link
            .send(&ControlMessage::ConnectivityCandidate {
                target_id: self.state.peer.clone(),
                candidate,
                id: self.local_id.clone(),
            })
            .await?;
        debug!("Sent ICE candidate");
        Ok(())
    }

    fn on_connection_state(&mut self, state: ConnectionState) -> Option<SessionEnd> {
        let (phase, end) = match state {
            ConnectionState::Connected => {
                self.state.phase = Phase::Connected;
                info!("Peer connection established");
                return None;
            }
            ConnectionState::Disconnected => (Phase::Disconnected, SessionEnd::Disconnected),
            ConnectionState::Failed => (Phase::Failed, SessionEnd::Failed),
            ConnectionState::Closed => (Phase::Closed, SessionEnd::Closed),
            ConnectionState::New | ConnectionState::Connecting => {
                debug!(?state, "Connection state");
                return None;
            }
        };
        self.state.phase = phase;
        info!(?state, "Peer connection ended");
        Some(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::peer::types::SdpKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        CreateOffer,
        CreateAnswer,
        SetLocal(SdpKind),
        SetRemote(SdpKind, String),
        AddCandidate(String),
        Close,
    }

    #[derive(Default)]
    struct FakeTransport {
        calls: Mutex<Vec<Call>>,
        fail_remote_description: bool,
    }

    impl FakeTransport {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl PeerTransport for FakeTransport {
        async fn create_offer(&self) -> Result<SessionDescription> {
            self.record(Call::CreateOffer);
            Ok(SessionDescription::offer("v=0 offer"))
        }

        async fn create_answer(&self) -> Result<SessionDescription> {
            self.record(Call::CreateAnswer);
            Ok(SessionDescription::answer("v=0 answer"))
        }

        async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
            self.record(Call::SetLocal(desc.kind));
            Ok(())
        }

        async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
            if self.fail_remote_description {
                return Err(SessionError::Description("bad sdp".into()));
            }
            self.record(Call::SetRemote(desc.kind, desc.sdp));
            Ok(())
        }

        async fn add_remote_candidate(&self, candidate: String) -> Result<()> {
            self.record(Call::AddCandidate(candidate));
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.record(Call::Close);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingLink {
        sent: Arc<Mutex<Vec<ControlMessage>>>,
    }

    impl RecordingLink {
        fn sent(&self) -> Vec<ControlMessage> {
            self.sent.lock().unwrap().clone()
        }

        fn kinds(&self) -> Vec<&'static str> {
            self.sent().iter().map(|m| m.kind()).collect()
        }
    }

    #[async_trait]
    impl ControlSink for RecordingLink {
        async fn send(&mut self, message: &ControlMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn negotiator(id: &str) -> (Negotiator<FakeTransport, RecordingLink>, Arc<FakeTransport>, RecordingLink) {
        let transport = Arc::new(FakeTransport::default());
        let link = RecordingLink::default();
        let negotiator = Negotiator::new(PeerId::from(id), transport.clone(), link.clone());
        (negotiator, transport, link)
    }

    fn control(message: ControlMessage) -> NegotiationEvent {
        NegotiationEvent::Control(message)
    }

    fn registration(target: &str, me: &str) -> NegotiationEvent {
        control(ControlMessage::RegistrationResponse {
            target_id: target.into(),
            request: REQUEST_OFFER.into(),
            id: me.into(),
        })
    }

    fn offer_from(sender: &str, me: &str) -> NegotiationEvent {
        control(ControlMessage::SessionOffer {
            target_id: me.into(),
            offer: "v=0 remote offer".into(),
            id: sender.into(),
        })
    }

    fn answer_from(sender: &str, me: &str) -> NegotiationEvent {
        control(ControlMessage::SessionAnswer {
            target_id: me.into(),
            answer: "v=0 remote answer".into(),
            id: sender.into(),
        })
    }

    fn remote_candidate(sender: &str, candidate: &str) -> NegotiationEvent {
        control(ControlMessage::ConnectivityCandidate {
            target_id: PeerId::unknown(),
            candidate: candidate.into(),
            id: sender.into(),
        })
    }

    fn discovered(candidate: &str) -> NegotiationEvent {
        NegotiationEvent::CandidateDiscovered(candidate.into())
    }

    fn sent_candidates(link: &RecordingLink) -> Vec<String> {
        link.sent()
            .into_iter()
            .filter_map(|m| match m {
                ControlMessage::ConnectivityCandidate { candidate, .. } => Some(candidate),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn start_sends_registration_request() {
        let (mut n, _, link) = negotiator("A");
        assert_eq!(n.phase(), Phase::Idle);
        n.start().await.unwrap();
        assert_eq!(n.phase(), Phase::Requesting);
        assert_eq!(
            link.sent(),
            vec![ControlMessage::RegistrationRequest {
                target_id: PeerId::unknown(),
                id: "A".into(),
            }]
        );

        // a second start is a no-op
        n.start().await.unwrap();
        assert_eq!(link.sent().len(), 1);
    }

    #[tokio::test]
    async fn initiator_path() {
        let (mut n, transport, link) = negotiator("A");
        n.start().await.unwrap();

        n.handle(registration("B", "A")).await.unwrap();
        assert_eq!(n.role(), Role::Initiator);
        assert_eq!(n.peer(), Some(&PeerId::from("B")));
        assert_eq!(n.phase(), Phase::Offering);
        assert_eq!(
            link.sent()[1],
            ControlMessage::SessionOffer {
                target_id: "B".into(),
                offer: "v=0 offer".into(),
                id: "A".into(),
            }
        );
        assert_eq!(link.kinds(), vec!["signaling_request", "offer"]);

        n.handle(answer_from("B", "A")).await.unwrap();
        assert_eq!(n.phase(), Phase::Negotiating);
        assert_eq!(
            transport.calls(),
            vec![
                Call::CreateOffer,
                Call::SetLocal(SdpKind::Offer),
                Call::SetRemote(SdpKind::Answer, "v=0 remote answer".into()),
            ]
        );
    }

    #[tokio::test]
    async fn responder_path_never_offers() {
        let (mut n, transport, link) = negotiator("B");
        n.start().await.unwrap();

        n.handle(offer_from("A", "B")).await.unwrap();
        assert_eq!(n.role(), Role::Responder);
        assert_eq!(n.peer(), Some(&PeerId::from("A")));
        assert_eq!(n.phase(), Phase::Negotiating);
        assert_eq!(
            link.sent()[1],
            ControlMessage::SessionAnswer {
                target_id: "A".into(),
                answer: "v=0 answer".into(),
                id: "B".into(),
            }
        );
        assert_eq!(link.kinds(), vec!["signaling_request", "answer"]);
        assert!(!transport.calls().contains(&Call::CreateOffer));
        assert_eq!(
            transport.calls(),
            vec![
                Call::SetRemote(SdpKind::Offer, "v=0 remote offer".into()),
                Call::CreateAnswer,
                Call::SetLocal(SdpKind::Answer),
            ]
        );
    }

    #[tokio::test]
    async fn buffered_candidates_follow_offer_in_discovery_order() {
        let (mut n, _, link) = negotiator("A");
        n.start().await.unwrap();

        for c in ["c1", "c2", "c3", "c4"] {
            n.handle(discovered(c)).await.unwrap();
        }
        // nothing goes out before the description
        assert_eq!(link.kinds(), vec!["signaling_request"]);

        n.handle(registration("B", "A")).await.unwrap();
        assert_eq!(
            link.kinds(),
            vec!["signaling_request", "offer", "candidate", "candidate", "candidate", "candidate"]
        );
        assert_eq!(sent_candidates(&link), vec!["c1", "c2", "c3", "c4"]);
        for message in &link.sent()[2..] {
            match message {
                ControlMessage::ConnectivityCandidate { target_id, id, .. } => {
                    assert_eq!(target_id, &PeerId::from("B"));
                    assert_eq!(id, &PeerId::from("A"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn responder_flushes_after_answer() {
        let (mut n, _, link) = negotiator("B");
        n.start().await.unwrap();
        n.handle(discovered("x1")).await.unwrap();
        n.handle(discovered("x2")).await.unwrap();

        n.handle(offer_from("A", "B")).await.unwrap();
        assert_eq!(
            link.kinds(),
            vec!["signaling_request", "answer", "candidate", "candidate"]
        );
        assert_eq!(sent_candidates(&link), vec!["x1", "x2"]);
    }

    #[tokio::test]
    async fn candidates_after_flush_are_sent_immediately_once() {
        let (mut n, _, link) = negotiator("A");
        n.start().await.unwrap();
        n.handle(discovered("early")).await.unwrap();
        n.handle(registration("B", "A")).await.unwrap();
        n.handle(discovered("late")).await.unwrap();
        n.handle(answer_from("B", "A")).await.unwrap();
        n.handle(discovered("later")).await.unwrap();

        assert_eq!(sent_candidates(&link), vec!["early", "late", "later"]);
    }

    #[tokio::test]
    async fn second_registration_response_is_ignored() {
        let (mut n, transport, link) = negotiator("A");
        n.start().await.unwrap();
        n.handle(registration("B", "A")).await.unwrap();
        n.handle(registration("C", "A")).await.unwrap();

        assert_eq!(n.peer(), Some(&PeerId::from("B")));
        assert_eq!(link.kinds(), vec!["signaling_request", "offer"]);
        assert_eq!(
            transport.calls().iter().filter(|c| **c == Call::CreateOffer).count(),
            1
        );
    }

    #[tokio::test]
    async fn offer_after_becoming_initiator_is_ignored() {
        let (mut n, transport, link) = negotiator("A");
        n.start().await.unwrap();
        n.handle(registration("B", "A")).await.unwrap();
        n.handle(offer_from("B", "A")).await.unwrap();

        assert_eq!(n.role(), Role::Initiator);
        assert_eq!(n.phase(), Phase::Offering);
        assert_eq!(link.kinds(), vec!["signaling_request", "offer"]);
        assert!(!transport.calls().contains(&Call::CreateAnswer));
    }

    #[tokio::test]
    async fn registration_after_becoming_responder_is_ignored() {
        let (mut n, transport, link) = negotiator("B");
        n.start().await.unwrap();
        n.handle(offer_from("A", "B")).await.unwrap();
        n.handle(registration("C", "B")).await.unwrap();

        assert_eq!(n.role(), Role::Responder);
        assert_eq!(n.peer(), Some(&PeerId::from("A")));
        assert_eq!(link.kinds(), vec!["signaling_request", "answer"]);
        assert!(!transport.calls().contains(&Call::CreateOffer));
    }

    #[tokio::test]
    async fn non_offer_registration_request_is_ignored() {
        let (mut n, _, link) = negotiator("A");
        n.start().await.unwrap();
        n.handle(control(ControlMessage::RegistrationResponse {
            target_id: "B".into(),
            request: "answer".into(),
            id: "A".into(),
        }))
        .await
        .unwrap();

        assert_eq!(n.phase(), Phase::Requesting);
        assert_eq!(n.role(), Role::Unassigned);
        assert_eq!(link.kinds(), vec!["signaling_request"]);
    }

    #[tokio::test]
    async fn duplicate_answer_is_ignored() {
        let (mut n, transport, _) = negotiator("A");
        n.start().await.unwrap();
        n.handle(registration("B", "A")).await.unwrap();
        n.handle(answer_from("B", "A")).await.unwrap();
        n.handle(answer_from("B", "A")).await.unwrap();

        assert_eq!(n.phase(), Phase::Negotiating);
        let remotes = transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::SetRemote(..)))
            .count();
        assert_eq!(remotes, 1);
    }

    #[tokio::test]
    async fn answer_from_stranger_is_ignored() {
        let (mut n, _, _) = negotiator("A");
        n.start().await.unwrap();
        n.handle(registration("B", "A")).await.unwrap();
        n.handle(answer_from("Mallory", "A")).await.unwrap();
        assert_eq!(n.phase(), Phase::Offering);
    }

    #[tokio::test]
    async fn offer_without_description_is_ignored() {
        let (mut n, transport, link) = negotiator("B");
        n.start().await.unwrap();

        let bare = ControlMessage::from_json(r#"{"type":"offer","id":"A"}"#).unwrap();
        let end = n.handle(control(bare)).await.unwrap();

        assert_eq!(end, None);
        assert_eq!(n.phase(), Phase::Requesting);
        assert_eq!(n.role(), Role::Unassigned);
        assert_eq!(n.peer(), None);
        assert!(transport.calls().is_empty());
        assert_eq!(link.kinds(), vec!["signaling_request"]);

        // a complete offer is still accepted afterwards
        n.handle(offer_from("A", "B")).await.unwrap();
        assert_eq!(n.role(), Role::Responder);
        assert_eq!(n.phase(), Phase::Negotiating);
    }

    #[tokio::test]
    async fn answer_without_description_is_ignored() {
        let (mut n, transport, link) = negotiator("A");
        n.start().await.unwrap();
        n.handle(registration("B", "A")).await.unwrap();
        let calls_before = transport.calls();

        let bare = ControlMessage::from_json(r#"{"type":"answer","id":"B"}"#).unwrap();
        let end = n.handle(control(bare)).await.unwrap();

        assert_eq!(end, None);
        assert_eq!(n.phase(), Phase::Offering);
        assert_eq!(n.role(), Role::Initiator);
        assert!(!n.state().remote_description_ready);
        assert_eq!(transport.calls(), calls_before);
        assert_eq!(link.kinds(), vec!["signaling_request", "offer"]);

        n.handle(answer_from("B", "A")).await.unwrap();
        assert_eq!(n.phase(), Phase::Negotiating);
    }

    #[tokio::test]
    async fn unknown_message_changes_nothing() {
        let (mut n, transport, link) = negotiator("A");
        n.start().await.unwrap();
        let before = n.state().clone();

        let end = n.handle(control(ControlMessage::Unknown)).await.unwrap();
        assert_eq!(end, None);
        assert_eq!(n.phase(), before.phase);
        assert_eq!(n.role(), before.role);
        assert_eq!(link.kinds(), vec!["signaling_request"]);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn early_remote_candidates_wait_for_the_answer() {
        let (mut n, transport, _) = negotiator("A");
        n.start().await.unwrap();
        n.handle(registration("B", "A")).await.unwrap();
        n.handle(remote_candidate("B", "r1")).await.unwrap();
        n.handle(remote_candidate("B", "r2")).await.unwrap();
        assert!(!transport.calls().contains(&Call::AddCandidate("r1".into())));

        n.handle(answer_from("B", "A")).await.unwrap();
        n.handle(remote_candidate("B", "r3")).await.unwrap();

        let added: Vec<Call> = transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::AddCandidate(_)))
            .collect();
        assert_eq!(
            added,
            vec![
                Call::AddCandidate("r1".into()),
                Call::AddCandidate("r2".into()),
                Call::AddCandidate("r3".into()),
            ]
        );
    }

    #[tokio::test]
    async fn remote_candidates_need_a_known_peer() {
        let (mut n, transport, _) = negotiator("B");
        n.start().await.unwrap();
        n.handle(remote_candidate("A", "stray")).await.unwrap();
        n.handle(offer_from("A", "B")).await.unwrap();
        n.handle(remote_candidate("Mallory", "foreign")).await.unwrap();
        n.handle(remote_candidate("A", "good")).await.unwrap();

        let added: Vec<Call> = transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::AddCandidate(_)))
            .collect();
        assert_eq!(added, vec![Call::AddCandidate("good".into())]);
    }

    #[tokio::test]
    async fn connection_states_drive_the_end_of_the_session() {
        let (mut n, _, link) = negotiator("A");
        n.start().await.unwrap();
        n.handle(registration("B", "A")).await.unwrap();
        n.handle(answer_from("B", "A")).await.unwrap();

        let end = n
            .handle(NegotiationEvent::ConnectionStateChanged(ConnectionState::Connecting))
            .await
            .unwrap();
        assert_eq!(end, None);
        assert_eq!(n.phase(), Phase::Negotiating);

        n.handle(NegotiationEvent::ConnectionStateChanged(ConnectionState::Connected))
            .await
            .unwrap();
        assert_eq!(n.phase(), Phase::Connected);

        let end = n
            .handle(NegotiationEvent::ConnectionStateChanged(ConnectionState::Failed))
            .await
            .unwrap();
        assert_eq!(end, Some(SessionEnd::Failed));
        assert_eq!(n.phase(), Phase::Failed);

        // terminal: later traffic is dropped
        let sent = link.sent().len();
        n.handle(discovered("after")).await.unwrap();
        let end = n
            .handle(NegotiationEvent::ConnectionStateChanged(ConnectionState::Closed))
            .await
            .unwrap();
        assert_eq!(end, None);
        assert_eq!(n.phase(), Phase::Failed);
        assert_eq!(link.sent().len(), sent);
    }

    #[tokio::test]
    async fn disconnect_and_close_map_to_matching_ends() {
        for (state, phase, expected) in [
            (ConnectionState::Disconnected, Phase::Disconnected, SessionEnd::Disconnected),
            (ConnectionState::Closed, Phase::Closed, SessionEnd::Closed),
        ] {
            let (mut n, _, _) = negotiator("A");
            n.start().await.unwrap();
            let end = n
                .handle(NegotiationEvent::ConnectionStateChanged(state))
                .await
                .unwrap();
            assert_eq!(end, Some(expected));
            assert_eq!(n.phase(), phase);
        }
    }

    #[tokio::test]
    async fn description_failure_is_fatal() {
        let transport = Arc::new(FakeTransport {
            fail_remote_description: true,
            ..Default::default()
        });
        let link = RecordingLink::default();
        let mut n = Negotiator::new(PeerId::from("B"), transport, link.clone());
        n.start().await.unwrap();

        let result = n.handle(offer_from("A", "B")).await;
        assert!(matches!(result, Err(SessionError::Description(_))));
        assert_eq!(link.kinds(), vec!["signaling_request"]);
    }
}
