use async_trait::async_trait;
use huddle_core::{PeerId, ServerMessage};

/// Push side of the signaling channel, as seen by room actors.
///
/// Delivery to a participant that is no longer connected is dropped.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn deliver(&self, peer_id: PeerId, msg: ServerMessage);
}
