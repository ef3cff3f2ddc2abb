use super::Session;
use crate::slot::{CloseReason, PeerSlot, Role, SlotState};
use crate::transport::TransportSink;
use huddle_core::{
    ClientMessage, IceCandidate, IceServerConfig, PeerId, RoomId, ServerMessage, SignalPayload,
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl Session {
    pub(crate) async fn handle_signal(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome {
                peer_id,
                ice_servers,
            } => self.on_welcome(peer_id, ice_servers).await,

            ServerMessage::RoomSnapshot { room, peers } => self.on_snapshot(room, peers).await,

            ServerMessage::PeerJoined { peer_id } => {
                self.members.insert(peer_id.clone());
                self.discover(peer_id).await;
            }

            ServerMessage::PeerLeft { peer_id } => {
                self.members.remove(&peer_id);
                self.close_slot(&peer_id, CloseReason::RemoteLeft).await;
            }

            ServerMessage::Signal { from, payload } => {
                if !self.members.contains(&from) {
                    debug!(peer = %from, "Dropping signal from a non-member");
                    return;
                }
                match SignalPayload::from_value(payload) {
                    Ok(SignalPayload::Offer { sdp }) => self.on_offer(from, sdp).await,
                    Ok(SignalPayload::Answer { sdp }) => self.on_answer(from, sdp).await,
                    Ok(SignalPayload::Candidate(candidate)) => {
                        self.on_candidate(from, candidate).await
                    }
                    Err(e) => warn!(peer = %from, "Dropping undecodable signal: {}", e),
                }
            }

            ServerMessage::Error { message } => {
                warn!("Signaling server reported an error: {}", message);
            }
        }
    }

    async fn on_welcome(&mut self, peer_id: PeerId, ice_servers: Vec<IceServerConfig>) {
        info!(peer = %peer_id, "Identity assigned by signaling server");
        self.ice_servers = ice_servers;

        let previous = self.local_id.replace(peer_id.clone());
        if previous.is_some_and(|previous| previous != peer_id) {
            // Remote participants saw the old identity leave.
            for remote in self.slots.peers() {
                self.close_slot(&remote, CloseReason::IdentityChanged).await;
            }
            self.members.clear();
        }

        self.identity.send_replace(Some(peer_id));
    }

    async fn on_snapshot(&mut self, room: RoomId, peers: Vec<PeerId>) {
        if room != self.config.room {
            debug!(%room, "Ignoring snapshot for another room");
            return;
        }

        self.members = peers.iter().cloned().collect::<HashSet<_>>();

        for remote in self.slots.peers() {
            if !self.members.contains(&remote) {
                self.close_slot(&remote, CloseReason::RemoteLeft).await;
            }
        }

        info!(%room, peers = peers.len(), "Room snapshot received");
        for remote in peers {
            self.discover(remote).await;
        }
    }

    /// The side with the smaller id offers; the other one waits.
    async fn discover(&mut self, remote: PeerId) {
        let initiates = self
            .local_id
            .as_ref()
            .is_some_and(|local| local.initiates_toward(&remote));

        if !initiates {
            debug!(peer = %remote, "Waiting for the remote side to offer");
            return;
        }
        if !self.open_slot(&remote, Role::Initiator).await {
            return;
        }

        let offer = match self.slots.get(&remote) {
            Some(slot) => slot.transport().create_offer().await,
            None => return,
        };
        match offer {
            Ok(sdp) => self.send_payload(&remote, SignalPayload::Offer { sdp }),
            Err(e) => {
                warn!(peer = %remote, "Failed to create offer: {}", e);
                self.close_slot(&remote, CloseReason::NegotiationFailed).await;
            }
        }
    }

    async fn on_offer(&mut self, from: PeerId, sdp: String) {
        let local_initiates = self
            .local_id
            .as_ref()
            .is_some_and(|local| local.initiates_toward(&from));

        match self.slots.get(&from).map(|slot| slot.state()) {
            Some(SlotState::Negotiating(Role::Initiator)) if local_initiates => {
                debug!(peer = %from, "Offer collision, keeping our own offer");
                return;
            }
            Some(SlotState::Negotiating(Role::Initiator)) => {
                info!(peer = %from, "Offer collision, yielding to the remote offer");
                self.close_slot(&from, CloseReason::Superseded).await;
                if !self.open_slot(&from, Role::Responder).await {
                    return;
                }
            }
            Some(_) => debug!(peer = %from, "Renegotiation offer on a live slot"),
            None => {
                if !self.open_slot(&from, Role::Responder).await {
                    return;
                }
            }
        }

        let answer = match self.slots.get(&from) {
            Some(slot) => slot.transport().accept_offer(sdp).await,
            None => return,
        };
        match answer {
            Ok(sdp) => self.send_payload(&from, SignalPayload::Answer { sdp }),
            Err(e) => {
                warn!(peer = %from, "Failed to answer offer: {}", e);
                self.close_slot(&from, CloseReason::NegotiationFailed).await;
            }
        }
    }

    async fn on_answer(&mut self, from: PeerId, sdp: String) {
        let Some(slot) = self.slots.get(&from) else {
            debug!(peer = %from, "Answer without a slot");
            return;
        };
        if slot.state() != SlotState::Negotiating(Role::Initiator) {
            debug!(peer = %from, state = ?slot.state(), "Unexpected answer");
            return;
        }

        let Err(e) = slot.transport().accept_answer(sdp).await else {
            return;
        };
        warn!(peer = %from, "Failed to apply answer: {}", e);
        self.close_slot(&from, CloseReason::NegotiationFailed).await;
    }

    async fn on_candidate(&mut self, from: PeerId, candidate: IceCandidate) {
        let Some(slot) = self.slots.get(&from) else {
            debug!(peer = %from, "Candidate without a slot");
            return;
        };
        let Err(e) = slot.transport().add_candidate(candidate).await else {
            return;
        };
        warn!(peer = %from, "Failed to add ICE candidate: {}", e);
    }

    /// Opens a slot toward `remote` bound to the current media.
    /// Returns false if none was opened.
    async fn open_slot(&mut self, remote: &PeerId, role: Role) -> bool {
        if self.outgoing.is_none() {
            warn!(peer = %remote, "Signaling unavailable, not opening a slot");
            return false;
        }
        if let Some(existing) = self.slots.get(remote) {
            debug!(peer = %remote, state = ?existing.state(), "Slot already exists");
            return false;
        }

        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let sink = TransportSink::new(remote.clone(), epoch, self.event_tx.clone());

        let transport = match self
            .transports
            .open(remote, &self.media, &self.ice_servers, sink)
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                warn!(peer = %remote, "Failed to open transport: {}", e);
                return false;
            }
        };

        let mut slot = PeerSlot::new(remote.clone(), epoch, role, transport, self.media.clone());
        slot.arm_timer(self.spawn_negotiation_timer(remote, epoch));

        if let Err(rejected) = self.slots.insert(slot) {
            rejected.close().await;
            return false;
        }
        self.publish_slots();

        info!(peer = %remote, ?role, "Peer slot opened");
        true
    }

    pub(crate) fn send_payload(&self, to: &PeerId, payload: SignalPayload) {
        let payload = match payload.to_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(peer = %to, "Failed to encode signal: {}", e);
                return;
            }
        };
        self.send(ClientMessage::Signal {
            to: to.clone(),
            payload,
        });
    }
}
