use super::{
    ConnectionState, PeerTransport, RemoteTrack, TransportEvent, TransportFactory, TransportSink,
};
use crate::error::TransportError;
use crate::media::{LocalMedia, TrackKind};
use async_trait::async_trait;
use huddle_core::utils::DEFAULT_STUN_ADDRS;
use huddle_core::{IceCandidate, IceServerConfig, PeerId};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;

/// ICE servers used when the signaling server announces none.
#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: DEFAULT_STUN_ADDRS.iter().map(|url| url.to_string()).collect(),
                username: None,
                credential: None,
            }],
        }
    }
}

/// Opens real WebRTC peer connections carrying one audio and one video track.
pub struct WebRtcTransportFactory {
    api: API,
    config: WebRtcConfig,
}

impl WebRtcTransportFactory {
    pub fn new(config: WebRtcConfig) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, config })
    }

    fn rtc_ice_servers(&self, announced: &[IceServerConfig]) -> Vec<RTCIceServer> {
        let servers = if announced.is_empty() {
            &self.config.ice_servers
        } else {
            announced
        };

        servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn open(
        &self,
        remote: &PeerId,
        media: &LocalMedia,
        ice_servers: &[IceServerConfig],
        sink: TransportSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError> {
        let rtc_config = RTCConfiguration {
            ice_servers: self.rtc_ice_servers(ice_servers),
            ..Default::default()
        };

        let peer_connection = Arc::new(self.api.new_peer_connection(rtc_config).await?);

        let audio_sender = peer_connection.add_track(media.audio().local()).await?;
        let video_sender = peer_connection.add_track(media.video().local()).await?;
        drain_rtcp(Arc::clone(&audio_sender));
        drain_rtcp(Arc::clone(&video_sender));

        let state_sink = sink.clone();
        let state_peer = remote.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let sink = state_sink.clone();
                let peer = state_peer.clone();

                Box::pin(async move {
                    info!("Peer connection state changed for {}: {:?}", peer, state);
                    if let Some(state) = map_state(state) {
                        sink.emit(TransportEvent::StateChanged(state));
                    }
                })
            },
        ));

        let ice_sink = sink.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let sink = ice_sink.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                match candidate.to_json() {
                    Ok(init) => sink.emit(TransportEvent::Candidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index,
                    })),
                    Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
                }
            })
        }));

        let track_sink = sink;
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let sink = track_sink.clone();

            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    _ => TrackKind::Video,
                };
                debug!("Remote {:?} track {} arrived from {}", kind, track.id(), sink.remote());
                sink.emit(TransportEvent::RemoteTrack(RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                    handle: Some(track),
                }));
            })
        }));

        Ok(Box::new(WebRtcTransport {
            peer_connection,
            audio_sender,
            video_sender,
        }))
    }
}

/// Keeps the sender's interceptors fed; RTCP is otherwise unused.
fn drain_rtcp(sender: Arc<RTCRtpSender>) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        while sender.read(&mut buf).await.is_ok() {}
    });
}

fn map_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New | RTCPeerConnectionState::Connecting => {
            Some(ConnectionState::Connecting)
        }
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        _ => None,
    }
}

pub struct WebRtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    audio_sender: Arc<RTCRtpSender>,
    video_sender: Arc<RTCRtpSender>,
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self) -> Result<String, TransportError> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn accept_offer(&self, sdp: String) -> Result<String, TransportError> {
        let offer = RTCSessionDescription::offer(sdp)?;
        self.peer_connection.set_remote_description(offer).await?;

        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn accept_answer(&self, sdp: String) -> Result<(), TransportError> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.peer_connection.set_remote_description(answer).await?;
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: None,
            })
            .await?;
        Ok(())
    }

    async fn replace_tracks(&self, media: &LocalMedia) -> Result<(), TransportError> {
        self.audio_sender
            .replace_track(Some(media.audio().local()))
            .await?;
        self.video_sender
            .replace_track(Some(media.video().local()))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.peer_connection.close().await {
            debug!("Peer connection close reported: {}", e);
        }
    }
}
