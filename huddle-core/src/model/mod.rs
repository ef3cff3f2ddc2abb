mod payload;
mod peer;
mod room;
mod signaling;

pub use payload::{IceCandidate, SignalPayload};
pub use peer::PeerId;
pub use room::RoomId;
pub use signaling::{ClientMessage, IceServerConfig, ServerMessage};
