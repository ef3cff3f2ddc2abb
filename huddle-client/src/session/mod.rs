mod event_impl;
mod media_impl;
mod signal_impl;

use crate::error::{MediaError, SessionError};
use crate::media::{LocalMedia, MediaDevices, MediaKind};
use crate::signaling::SignalingChannel;
use crate::slot::{CloseReason, SlotRegistry, SlotView};
use crate::transport::{RemoteMedia, TransportEvent, TransportFactory};
use huddle_core::{ClientMessage, IceServerConfig, PeerId, RoomId, ServerMessage};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub room: RoomId,
    /// Media acquired before joining. Failure to acquire it aborts startup.
    pub initial_media: MediaKind,
    /// How long a slot may stay negotiating before it is closed.
    pub negotiation_timeout: Duration,
    pub command_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room: RoomId::from("lobby"),
            initial_media: MediaKind::Camera,
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
            command_capacity: 32,
        }
    }
}

pub(crate) type MediaReply = oneshot::Sender<Result<(), SessionError>>;

pub(crate) enum SessionCommand {
    /// `None` toggles between camera and screen.
    ReplaceMedia {
        kind: Option<MediaKind>,
        reply: MediaReply,
    },
    Reattach {
        channel: SignalingChannel,
        reply: oneshot::Sender<()>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) enum SessionEvent {
    Transport {
        remote: PeerId,
        epoch: u64,
        event: TransportEvent,
    },
    NegotiationTimeout {
        remote: PeerId,
        epoch: u64,
    },
    MediaAcquired {
        request: u64,
        result: Result<LocalMedia, MediaError>,
        reply: Option<MediaReply>,
    },
    LocalTrackEnded {
        generation: u64,
    },
}

/// Per-participant controller: owns one slot per remote participant and
/// the currently published local media.
///
/// Runs as a single task. Signaling messages, transport callbacks, timers
/// and media acquisitions are all serialized through its loop, so slot and
/// media state never change concurrently.
pub struct Session {
    config: SessionConfig,
    local_id: Option<PeerId>,
    ice_servers: Vec<IceServerConfig>,
    members: HashSet<PeerId>,
    slots: SlotRegistry,
    next_epoch: u64,

    media: Arc<LocalMedia>,
    media_generation: u64,
    media_request: u64,
    track_watch: Option<JoinHandle<()>>,

    devices: Arc<dyn MediaDevices>,
    transports: Arc<dyn TransportFactory>,

    outgoing: Option<mpsc::UnboundedSender<ClientMessage>>,
    incoming: Option<mpsc::UnboundedReceiver<ServerMessage>>,
    command_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,

    identity: watch::Sender<Option<PeerId>>,
    local_media: watch::Sender<Arc<LocalMedia>>,
    fallback_failure: watch::Sender<Option<MediaError>>,
    remote_media: watch::Sender<HashMap<PeerId, RemoteMedia>>,
    slot_views: watch::Sender<HashMap<PeerId, SlotView>>,
}

impl Session {
    /// Acquires the initial media, then joins `config.room` over `channel`.
    ///
    /// Nothing is sent to the signaling server if media acquisition fails.
    pub async fn start(
        config: SessionConfig,
        devices: Arc<dyn MediaDevices>,
        transports: Arc<dyn TransportFactory>,
        channel: SignalingChannel,
    ) -> Result<SessionHandle, SessionError> {
        let media = match devices.acquire(config.initial_media).await {
            Ok(media) => Arc::new(media),
            Err(e) => {
                warn!(
                    "Could not acquire {} for room {}: {}",
                    config.initial_media, config.room, e
                );
                return Err(SessionError::Media(e));
            }
        };

        let (outgoing, incoming) = channel.into_parts();
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (identity, identity_rx) = watch::channel(None);
        let (local_media, local_media_rx) = watch::channel(media.clone());
        let (fallback_failure, fallback_failure_rx) = watch::channel(None);
        let (remote_media, remote_media_rx) = watch::channel(HashMap::new());
        let (slot_views, slot_views_rx) = watch::channel(HashMap::new());

        let mut session = Session {
            config,
            local_id: None,
            ice_servers: Vec::new(),
            members: HashSet::new(),
            slots: SlotRegistry::new(),
            next_epoch: 0,
            media,
            media_generation: 0,
            media_request: 0,
            track_watch: None,
            devices,
            transports,
            outgoing: Some(outgoing),
            incoming: Some(incoming),
            command_rx,
            event_tx,
            event_rx,
            identity,
            local_media,
            fallback_failure,
            remote_media,
            slot_views,
        };

        session.watch_local_tracks();
        session.send(ClientMessage::JoinRoom {
            room: session.config.room.clone(),
        });

        tokio::spawn(session.run());

        Ok(SessionHandle {
            commands: command_tx,
            identity: identity_rx,
            local_media: local_media_rx,
            fallback_failure: fallback_failure_rx,
            remote_media: remote_media_rx,
            slots: slot_views_rx,
        })
    }

    async fn run(mut self) {
        info!(room = %self.config.room, "Session event loop started");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => {
                            if self.handle_command(c).await.is_break() {
                                break;
                            }
                        }
                        None => {
                            info!("All session handles dropped. Leaving room.");
                            self.teardown().await;
                            break;
                        }
                    }
                }

                msg = next_signal(&mut self.incoming) => {
                    match msg {
                        Some(m) => self.handle_signal(m).await,
                        None => self.on_signaling_lost(),
                    }
                }

                Some(evt) = self.event_rx.recv() => {
                    self.handle_event(evt).await;
                }
            }
        }

        info!(room = %self.config.room, "Session event loop finished");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> ControlFlow<()> {
        match cmd {
            SessionCommand::ReplaceMedia { kind, reply } => {
                let kind = kind.unwrap_or_else(|| self.media.kind().toggled());
                self.request_media(kind, Some(reply));
            }

            SessionCommand::Reattach { channel, reply } => {
                let (outgoing, incoming) = channel.into_parts();
                self.outgoing = Some(outgoing);
                self.incoming = Some(incoming);
                info!(room = %self.config.room, "Signaling reattached, re-joining room");
                self.send(ClientMessage::JoinRoom {
                    room: self.config.room.clone(),
                });
                let _ = reply.send(());
            }

            SessionCommand::Leave { reply } => {
                self.teardown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    /// Slots survive a lost signaling channel, but no new ones are opened
    /// and nothing is sent until the session is reattached.
    fn on_signaling_lost(&mut self) {
        warn!(
            room = %self.config.room,
            slots = self.slots.len(),
            "Signaling channel lost, keeping existing slots"
        );
        self.incoming = None;
        self.outgoing = None;
    }

    pub(crate) fn send(&self, msg: ClientMessage) {
        let Some(outgoing) = &self.outgoing else {
            return;
        };
        if outgoing.send(msg).is_err() {
            warn!("Signaling channel closed while sending");
        }
    }

    pub(crate) async fn close_slot(&mut self, remote: &PeerId, reason: CloseReason) {
        let Some(slot) = self.slots.remove(remote) else {
            return;
        };
        slot.close().await;

        self.remote_media
            .send_if_modified(|media| media.remove(remote).is_some());
        self.publish_slots();

        info!(peer = %remote, ?reason, "Peer slot closed");
    }

    pub(crate) fn publish_slots(&self) {
        self.slot_views.send_replace(self.slots.views());
    }

    async fn teardown(&mut self) {
        for slot in self.slots.drain() {
            slot.close().await;
        }
        self.members.clear();
        self.remote_media.send_replace(HashMap::new());
        self.publish_slots();

        self.send(ClientMessage::LeaveRoom);
        self.outgoing = None;
        self.incoming = None;

        if let Some(watch) = self.track_watch.take() {
            watch.abort();
        }
        self.devices.release(&self.media).await;

        // Acquisitions still in flight release their own media once the
        // queue is closed. Anything already queued is released here.
        self.event_rx.close();
        while let Ok(event) = self.event_rx.try_recv() {
            media_impl::release_unclaimed(self.devices.as_ref(), event).await;
        }

        info!(room = %self.config.room, "Session torn down");
    }
}

async fn next_signal(
    incoming: &mut Option<mpsc::UnboundedReceiver<ServerMessage>>,
) -> Option<ServerMessage> {
    match incoming {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable control surface for a running [`Session`].
///
/// The session leaves its room once every handle has been dropped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    identity: watch::Receiver<Option<PeerId>>,
    local_media: watch::Receiver<Arc<LocalMedia>>,
    fallback_failure: watch::Receiver<Option<MediaError>>,
    remote_media: watch::Receiver<HashMap<PeerId, RemoteMedia>>,
    slots: watch::Receiver<HashMap<PeerId, SlotView>>,
}

impl SessionHandle {
    /// Switches every slot to freshly acquired `kind` media.
    ///
    /// If another request is issued before this one completes, the later
    /// one wins and this returns [`SessionError::Superseded`].
    pub async fn replace_media(&self, kind: MediaKind) -> Result<(), SessionError> {
        self.request_media(Some(kind)).await
    }

    /// Camera becomes screen, screen becomes camera.
    pub async fn toggle_media(&self) -> Result<(), SessionError> {
        self.request_media(None).await
    }

    async fn request_media(&self, kind: Option<MediaKind>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::ReplaceMedia { kind, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn reattach(&self, channel: SignalingChannel) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Reattach { channel, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Closes every slot, leaves the room and releases local media.
    /// Leaving an already closed session is a no-op.
    pub async fn leave(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Leave { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Id assigned by the signaling server, once known.
    pub fn local_peer_id(&self) -> Option<PeerId> {
        self.identity.borrow().clone()
    }

    pub fn local_media(&self) -> Arc<LocalMedia> {
        self.local_media.borrow().clone()
    }

    /// Why the camera could not be restored after a screen share ended.
    ///
    /// While set, the ended screen track stays published and nothing retries;
    /// the next successful media replacement clears it.
    pub fn fallback_failure(&self) -> watch::Receiver<Option<MediaError>> {
        self.fallback_failure.clone()
    }

    pub fn slots(&self) -> HashMap<PeerId, SlotView> {
        self.slots.borrow().clone()
    }

    pub fn watch_slots(&self) -> watch::Receiver<HashMap<PeerId, SlotView>> {
        self.slots.clone()
    }

    /// Media received from each connected participant, keyed by sender.
    pub fn remote_media(&self) -> watch::Receiver<HashMap<PeerId, RemoteMedia>> {
        self.remote_media.clone()
    }
}
