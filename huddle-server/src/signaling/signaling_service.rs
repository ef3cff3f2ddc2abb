use crate::error::RegistryError;
use crate::room::RoomRegistry;
use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use dashmap::DashMap;
use huddle_core::{ClientMessage, IceServerConfig, PeerId, RoomId, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

struct ParticipantSession {
    outbox: mpsc::UnboundedSender<ServerMessage>,
    room: Option<RoomId>,
}

struct SignalingInner {
    participants: DashMap<PeerId, ParticipantSession>,
    ice_servers: Vec<IceServerConfig>,
}

/// Participant directory plus relay.
///
/// A participant exists from [`SignalingService::connect`] until the first
/// [`SignalingService::disconnect`]; removal from the directory is what makes
/// the implicit leave run exactly once.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
    rooms: RoomRegistry,
}

impl SignalingService {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        let inner = Arc::new(SignalingInner {
            participants: DashMap::new(),
            ice_servers,
        });
        let rooms = RoomRegistry::new(inner.clone());

        Self { inner, rooms }
    }

    pub fn get_ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Registers a new participant and greets it with its id.
    pub fn connect(&self) -> (PeerId, mpsc::UnboundedReceiver<ServerMessage>) {
        let peer_id = PeerId::new();
        let (outbox, rx) = mpsc::unbounded_channel();

        let _ = outbox.send(ServerMessage::Welcome {
            peer_id: peer_id.clone(),
            ice_servers: self.inner.ice_servers.clone(),
        });
        self.inner
            .participants
            .insert(peer_id.clone(), ParticipantSession { outbox, room: None });

        info!(peer = %peer_id, "Participant connected");
        (peer_id, rx)
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.inner.participants.contains_key(peer_id)
    }

    pub fn room_of(&self, peer_id: &PeerId) -> Option<RoomId> {
        self.inner
            .participants
            .get(peer_id)
            .and_then(|session| session.room.clone())
    }

    pub fn handle_message(&self, from: &PeerId, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinRoom { room } => self.join(from, room),
            ClientMessage::Signal { to, payload } => self.relay(from, &to, payload),
            ClientMessage::LeaveRoom => self.leave(from),
        }
    }

    /// Moves `peer_id` into `room`, leaving whatever room it was in before.
    pub fn join(&self, peer_id: &PeerId, room: RoomId) {
        let previous = {
            let Some(mut session) = self.inner.participants.get_mut(peer_id) else {
                debug!(peer = %peer_id, "Join from unknown participant ignored");
                return;
            };
            session.room.replace(room.clone())
        };

        if let Some(previous) = previous.filter(|previous| *previous != room) {
            self.rooms.leave(&previous, peer_id.clone());
        }
        self.rooms.join(&room, peer_id.clone());
    }

    /// Forwards `payload` to `to` when both sit in the same room; drops it otherwise.
    pub fn relay(&self, from: &PeerId, to: &PeerId, payload: serde_json::Value) {
        if from == to {
            debug!(peer = %from, "Dropping signal addressed to its sender");
            return;
        }
        let Some(room) = self.room_of(from) else {
            debug!(from = %from, to = %to, "Dropping signal from participant outside any room");
            return;
        };
        let Some(target) = self.inner.participants.get(to) else {
            debug!(from = %from, to = %to, "Dropping signal for disconnected participant");
            return;
        };
        if target.room.as_ref() != Some(&room) {
            debug!(from = %from, to = %to, "Dropping signal across rooms");
            return;
        }

        let _ = target.outbox.send(ServerMessage::Signal {
            from: from.clone(),
            payload,
        });
    }

    /// Explicit leave: the participant stays connected but belongs to no room.
    pub fn leave(&self, peer_id: &PeerId) {
        let room = self
            .inner
            .participants
            .get_mut(peer_id)
            .and_then(|mut session| session.room.take());

        if let Some(room) = room {
            self.rooms.leave(&room, peer_id.clone());
        }
    }

    /// Transport loss. Safe to call any number of times.
    pub fn disconnect(&self, peer_id: &PeerId) {
        let Some((_, session)) = self.inner.participants.remove(peer_id) else {
            return;
        };
        info!(peer = %peer_id, "Participant disconnected");

        if let Some(room) = session.room {
            self.rooms.leave(&room, peer_id.clone());
        }
    }

    pub fn send_error(&self, peer_id: &PeerId, message: impl Into<String>) {
        if let Some(session) = self.inner.participants.get(peer_id) {
            let _ = session.outbox.send(ServerMessage::Error {
                message: message.into(),
            });
        }
    }

    pub async fn snapshot(&self, room: &RoomId) -> Result<Vec<PeerId>, RegistryError> {
        self.rooms.snapshot(room).await
    }
}

#[async_trait]
impl SignalingOutput for SignalingInner {
    async fn deliver(&self, peer_id: PeerId, msg: ServerMessage) {
        match self.participants.get(&peer_id) {
            Some(session) => {
                let _ = session.outbox.send(msg);
            }
            None => debug!(peer = %peer_id, "Dropping message for departed participant"),
        }
    }
}
