use huddle_core::RoomId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The room actor went away before answering.
    #[error("room {0} is unavailable")]
    RoomUnavailable(RoomId),
}
