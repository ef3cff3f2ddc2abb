use crate::error::MediaError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// What the local participant publishes: camera+mic or screen+mic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Camera,
    Screen,
}

impl MediaKind {
    pub fn toggled(self) -> Self {
        match self {
            MediaKind::Camera => MediaKind::Screen,
            MediaKind::Screen => MediaKind::Camera,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Camera => f.write_str("camera"),
            MediaKind::Screen => f.write_str("screen"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One outgoing track plus the capture source's "ended" signal.
#[derive(Clone)]
pub struct MediaTrack {
    kind: TrackKind,
    local: Arc<TrackLocalStaticSample>,
    ended: watch::Receiver<bool>,
}

/// Held by a capture source; flips the track to ended.
#[derive(Debug)]
pub struct TrackEnder(watch::Sender<bool>);

impl TrackEnder {
    pub fn end(&self) {
        self.0.send_replace(true);
    }
}

impl MediaTrack {
    pub fn new(
        kind: TrackKind,
        local: Arc<TrackLocalStaticSample>,
        ended: watch::Receiver<bool>,
    ) -> Self {
        Self { kind, local, ended }
    }

    /// A sample-fed track using the default codec for its kind (Opus or VP8).
    pub fn sample(kind: TrackKind, id: &str, stream_id: &str) -> (Self, TrackEnder) {
        let codec = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        };
        let local = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.to_owned(),
            stream_id.to_owned(),
        ));
        let (tx, rx) = watch::channel(false);

        (Self::new(kind, local, rx), TrackEnder(tx))
    }

    pub fn id(&self) -> &str {
        self.local.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn local(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.local.clone()
    }

    /// Where the capture source writes encoded samples.
    pub fn sample_writer(&self) -> &Arc<TrackLocalStaticSample> {
        &self.local
    }

    pub fn is_ended(&self) -> bool {
        *self.ended.borrow()
    }

    pub fn ended(&self) -> watch::Receiver<bool> {
        self.ended.clone()
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id())
            .field("kind", &self.kind)
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// The published audio+video pair. Slots hold it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct LocalMedia {
    kind: MediaKind,
    audio: MediaTrack,
    video: MediaTrack,
}

#[derive(Debug)]
pub struct MediaEnders {
    pub audio: TrackEnder,
    pub video: TrackEnder,
}

impl LocalMedia {
    pub fn new(kind: MediaKind, audio: MediaTrack, video: MediaTrack) -> Self {
        Self { kind, audio, video }
    }

    /// Sample-fed media labelled `label`; tracks are `{label}-audio` and `{label}-video`.
    pub fn sample(kind: MediaKind, label: &str) -> (Self, MediaEnders) {
        let (audio, audio_ender) =
            MediaTrack::sample(TrackKind::Audio, &format!("{label}-audio"), label);
        let (video, video_ender) =
            MediaTrack::sample(TrackKind::Video, &format!("{label}-video"), label);

        (
            Self::new(kind, audio, video),
            MediaEnders {
                audio: audio_ender,
                video: video_ender,
            },
        )
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn audio(&self) -> &MediaTrack {
        &self.audio
    }

    pub fn video(&self) -> &MediaTrack {
        &self.video
    }
}

/// Local capture capability (camera, microphone, display).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(&self, kind: MediaKind) -> Result<LocalMedia, MediaError>;

    /// Stops capture behind `media`. Called once per acquired media.
    async fn release(&self, media: &LocalMedia);
}
