use super::{Session, SessionEvent};
use crate::slot::{CloseReason, SlotState};
use crate::transport::{ConnectionState, TransportEvent};
use huddle_core::{PeerId, SignalPayload};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

impl Session {
    pub(crate) async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport {
                remote,
                epoch,
                event,
            } => {
                if !self.slots.is_current(&remote, epoch) {
                    debug!(peer = %remote, epoch, "Dropping event from a replaced transport");
                    return;
                }
                self.on_transport_event(remote, event).await;
            }

            SessionEvent::NegotiationTimeout { remote, epoch } => {
                if !self.slots.is_current(&remote, epoch) {
                    return;
                }
                let negotiating = self
                    .slots
                    .get(&remote)
                    .is_some_and(|slot| matches!(slot.state(), SlotState::Negotiating(_)));
                if negotiating {
                    warn!(peer = %remote, "Negotiation timed out");
                    self.close_slot(&remote, CloseReason::NegotiationTimeout)
                        .await;
                }
            }

            SessionEvent::MediaAcquired {
                request,
                result,
                reply,
            } => self.on_media_acquired(request, result, reply).await,

            SessionEvent::LocalTrackEnded { generation } => self.on_local_track_ended(generation),
        }
    }

    async fn on_transport_event(&mut self, remote: PeerId, event: TransportEvent) {
        match event {
            TransportEvent::Candidate(candidate) => {
                self.send_payload(&remote, SignalPayload::Candidate(candidate));
            }

            TransportEvent::StateChanged(ConnectionState::Connected) => {
                let Some(slot) = self.slots.get_mut(&remote) else {
                    return;
                };
                if slot.mark_connected() {
                    info!(peer = %remote, role = ?slot.role(), "Peer slot connected");
                    self.publish_slots();
                }
            }

            TransportEvent::StateChanged(ConnectionState::Failed) => {
                self.close_slot(&remote, CloseReason::NegotiationFailed)
                    .await;
            }

            TransportEvent::StateChanged(ConnectionState::Closed) => {
                self.close_slot(&remote, CloseReason::TransportClosed).await;
            }

            TransportEvent::StateChanged(state) => {
                debug!(peer = %remote, ?state, "Transport state changed");
            }

            TransportEvent::RemoteTrack(track) => {
                debug!(peer = %remote, track = %track.id, "Remote track received");
                self.remote_media.send_modify(|media| {
                    media.entry(remote).or_default().upsert(track);
                });
            }
        }
    }

    pub(crate) fn spawn_negotiation_timer(&self, remote: &PeerId, epoch: u64) -> JoinHandle<()> {
        let tx = self.event_tx.clone();
        let remote = remote.clone();
        let timeout = self.config.negotiation_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(SessionEvent::NegotiationTimeout { remote, epoch });
        })
    }
}
