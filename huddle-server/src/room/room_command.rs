use huddle_core::PeerId;
use tokio::sync::oneshot;

/// Commands a room actor consumes, in arrival order.
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a participant and announce it. Re-joining only re-sends the snapshot.
    Join { peer_id: PeerId },

    /// Remove a participant and announce its departure to the rest.
    Leave { peer_id: PeerId },

    /// Current membership, sorted by id.
    Snapshot { reply: oneshot::Sender<Vec<PeerId>> },
}
