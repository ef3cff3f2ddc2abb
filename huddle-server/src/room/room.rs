use crate::room::room_command::RoomCommand;
use crate::room::room_registry::RoomHandle;
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use huddle_core::{PeerId, RoomId, ServerMessage};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Single owner of one room's membership.
///
/// Every mutation and the notifications it causes happen inside one command,
/// so all members observe joins and departures in the same order.
pub struct Room {
    id: RoomId,
    members: BTreeSet<PeerId>,
    command_rx: mpsc::UnboundedReceiver<RoomCommand>,
    signaling: Arc<dyn SignalingOutput>,
    retirement: Option<Retirement>,
}

struct Retirement {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    epoch: u64,
}

impl Room {
    pub fn new(
        id: RoomId,
        command_rx: mpsc::UnboundedReceiver<RoomCommand>,
        signaling: Arc<dyn SignalingOutput>,
    ) -> Self {
        Self {
            id,
            members: BTreeSet::new(),
            command_rx,
            signaling,
            retirement: None,
        }
    }

    /// Lets the room drop its registry entry once it has no members left.
    pub(crate) fn retire_into(mut self, rooms: Arc<DashMap<RoomId, RoomHandle>>, epoch: u64) -> Self {
        self.retirement = Some(Retirement { rooms, epoch });
        self
    }

    pub async fn run(mut self) {
        info!(room = %self.id, "Room event loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;

            if self.members.is_empty() && self.try_retire() {
                break;
            }
        }

        info!(room = %self.id, "Room event loop finished");
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { peer_id } => {
                let fresh = self.members.insert(peer_id.clone());
                let others: Vec<PeerId> = self
                    .members
                    .iter()
                    .filter(|member| **member != peer_id)
                    .cloned()
                    .collect();

                if fresh {
                    info!(room = %self.id, peer = %peer_id, members = self.members.len(), "Participant joined");
                    // Announce before the snapshot goes out: anything the joiner
                    // sends in reaction to its snapshot reaches members that
                    // already know about it.
                    for member in &others {
                        self.signaling
                            .deliver(
                                member.clone(),
                                ServerMessage::PeerJoined {
                                    peer_id: peer_id.clone(),
                                },
                            )
                            .await;
                    }
                } else {
                    debug!(room = %self.id, peer = %peer_id, "Repeated join, re-sending snapshot");
                }

                self.signaling
                    .deliver(
                        peer_id,
                        ServerMessage::RoomSnapshot {
                            room: self.id.clone(),
                            peers: others,
                        },
                    )
                    .await;
            }

            RoomCommand::Leave { peer_id } => {
                if !self.members.remove(&peer_id) {
                    return;
                }
                info!(room = %self.id, peer = %peer_id, members = self.members.len(), "Participant left");

                for member in &self.members {
                    self.signaling
                        .deliver(
                            member.clone(),
                            ServerMessage::PeerLeft {
                                peer_id: peer_id.clone(),
                            },
                        )
                        .await;
                }
            }

            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.members.iter().cloned().collect());
            }
        }
    }

    fn try_retire(&self) -> bool {
        let Some(retirement) = &self.retirement else {
            return false;
        };
        let queue = &self.command_rx;

        // Senders enqueue while holding the entry, so an empty queue observed
        // under the same lock means nobody can still route work here.
        let retired = retirement
            .rooms
            .remove_if(&self.id, |_, handle| {
                handle.epoch == retirement.epoch && queue.is_empty()
            })
            .is_some();

        if retired {
            info!(room = %self.id, "Room is empty, retiring");
        }
        retired
    }
}
