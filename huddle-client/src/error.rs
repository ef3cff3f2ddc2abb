use crate::media::MediaKind;
use thiserror::Error;

/// Local capture could not produce media.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission to capture {0} was denied")]
    PermissionDenied(MediaKind),

    #[error("no {0} device available")]
    NoDevice(MediaKind),

    #[error("capture failed: {0}")]
    Capture(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("transport already closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("local media unavailable: {0}")]
    Media(#[from] MediaError),

    #[error("media request was superseded by a newer one")]
    Superseded,

    #[error("session is closed")]
    Closed,
}
