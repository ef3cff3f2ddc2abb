use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Participant id minted by the signaling server when a channel connects.
///
/// Ids are UUIDv7, so within one server process they sort by connect time.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PeerId(pub Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Whether this side sends the offer toward `remote`.
    ///
    /// The smaller id initiates. Both ends evaluate the same comparison, so
    /// exactly one of them initiates no matter which discovered the other first.
    pub fn initiates_toward(&self, remote: &PeerId) -> bool {
        self < remote
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for PeerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidPeerId(s.to_string()))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
