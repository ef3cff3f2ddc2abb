use crate::error::RegistryError;
use crate::room::{Room, RoomCommand};
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use huddle_core::{PeerId, RoomId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct RoomHandle {
    tx: mpsc::UnboundedSender<RoomCommand>,
    pub(crate) epoch: u64,
}

/// Routes commands to one actor per live room.
///
/// Rooms are spawned by the first join and retire themselves once empty.
/// Each registry is an independent service object; nothing here is global.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    signaling: Arc<dyn SignalingOutput>,
    next_epoch: Arc<AtomicU64>,
}

impl RoomRegistry {
    pub fn new(signaling: Arc<dyn SignalingOutput>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            signaling,
            next_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn join(&self, room_id: &RoomId, peer_id: PeerId) {
        self.dispatch(room_id, RoomCommand::Join { peer_id });
    }

    pub fn leave(&self, room_id: &RoomId, peer_id: PeerId) {
        self.dispatch(room_id, RoomCommand::Leave { peer_id });
    }

    /// Membership as the room actor currently sees it; empty for unknown rooms.
    pub async fn snapshot(&self, room_id: &RoomId) -> Result<Vec<PeerId>, RegistryError> {
        let (reply, rx) = oneshot::channel();
        if !self.dispatch(room_id, RoomCommand::Snapshot { reply }) {
            return Ok(Vec::new());
        }
        rx.await
            .map_err(|_| RegistryError::RoomUnavailable(room_id.clone()))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Returns false when the command had no room to go to.
    fn dispatch(&self, room_id: &RoomId, cmd: RoomCommand) -> bool {
        match self.rooms.entry(room_id.clone()) {
            Entry::Occupied(mut entry) => {
                let Err(mpsc::error::SendError(cmd)) = entry.get().tx.send(cmd) else {
                    return true;
                };
                warn!(room = %room_id, "Room actor is gone, respawning");
                let handle = self.spawn_room(room_id);
                let _ = handle.tx.send(cmd);
                entry.insert(handle);
                true
            }
            Entry::Vacant(entry) => {
                if !matches!(cmd, RoomCommand::Join { .. }) {
                    return false;
                }
                let handle = self.spawn_room(room_id);
                let _ = handle.tx.send(cmd);
                entry.insert(handle);
                true
            }
        }
    }

    fn spawn_room(&self, room_id: &RoomId) -> RoomHandle {
        info!(room = %room_id, "Creating new room");
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);

        let room = Room::new(room_id.clone(), rx, self.signaling.clone())
            .retire_into(self.rooms.clone(), epoch);
        tokio::spawn(room.run());

        RoomHandle { tx, epoch }
    }
}
