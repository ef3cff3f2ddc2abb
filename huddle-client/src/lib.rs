mod error;
mod media;
mod session;
mod signaling;
mod slot;
mod transport;

pub use error::*;
pub use media::*;
pub use session::{DEFAULT_NEGOTIATION_TIMEOUT, Session, SessionConfig, SessionHandle};
pub use signaling::SignalingChannel;
pub use slot::*;
pub use transport::*;
