pub mod ws_client;

pub use mock_signaling::*;
pub use test_participant::*;
pub use ws_client::*;
