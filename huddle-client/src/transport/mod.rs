mod webrtc_transport;

pub use webrtc_transport::*;

use crate::error::TransportError;
use crate::media::{LocalMedia, TrackKind};
use crate::session::SessionEvent;
use async_trait::async_trait;
use huddle_core::{IceCandidate, IceServerConfig, PeerId};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::track::track_remote::TrackRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    pub handle: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Tracks received from one remote participant, ready for presentation.
#[derive(Debug, Clone, Default)]
pub struct RemoteMedia {
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteMedia {
    pub fn audio(&self) -> Option<&RemoteTrack> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Audio)
    }

    pub fn video(&self) -> Option<&RemoteTrack> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    pub(crate) fn upsert(&mut self, track: RemoteTrack) {
        match self.tracks.iter_mut().find(|t| t.kind == track.kind) {
            Some(existing) => *existing = track,
            None => self.tracks.push(track),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    Candidate(IceCandidate),
    StateChanged(ConnectionState),
    RemoteTrack(RemoteTrack),
}

/// Feeds a transport's callbacks back into the owning session, tagged
/// with the slot they were opened for. Events from a replaced slot are
/// discarded by the session.
#[derive(Clone)]
pub struct TransportSink {
    remote: PeerId,
    epoch: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl TransportSink {
    pub(crate) fn new(remote: PeerId, epoch: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { remote, epoch, tx }
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(SessionEvent::Transport {
            remote: self.remote.clone(),
            epoch: self.epoch,
            event,
        });
    }
}

/// One peer-to-peer media connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Creates a local offer and applies it as the local description.
    async fn create_offer(&self) -> Result<String, TransportError>;

    /// Applies a remote offer and returns the applied local answer.
    async fn accept_offer(&self, sdp: String) -> Result<String, TransportError>;

    async fn accept_answer(&self, sdp: String) -> Result<(), TransportError>;

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Swaps the outgoing audio and video in place, without renegotiating.
    async fn replace_tracks(&self, media: &LocalMedia) -> Result<(), TransportError>;

    async fn close(&self);
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Opens a transport toward `remote` publishing `media`. Events go to `sink`.
    async fn open(
        &self,
        remote: &PeerId,
        media: &LocalMedia,
        ice_servers: &[IceServerConfig],
        sink: TransportSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError>;
}
