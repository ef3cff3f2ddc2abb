use super::{MediaReply, Session, SessionEvent};
use crate::error::{MediaError, SessionError};
use crate::media::{LocalMedia, MediaDevices, MediaKind};
use crate::slot::CloseReason;
use std::sync::Arc;
use tokio::sync::mpsc::error::SendError;
use tracing::{debug, info, warn};

impl Session {
    /// Acquisition runs off the loop. Only the most recent request is applied.
    pub(crate) fn request_media(&mut self, kind: MediaKind, reply: Option<MediaReply>) {
        self.media_request += 1;
        let request = self.media_request;
        let devices = self.devices.clone();
        let tx = self.event_tx.clone();

        info!(%kind, request, "Acquiring local media");
        tokio::spawn(async move {
            let result = devices.acquire(kind).await;
            let acquired = SessionEvent::MediaAcquired {
                request,
                result,
                reply,
            };
            // The loop is gone: nobody else will release this capture.
            if let Err(SendError(event)) = tx.send(acquired) {
                release_unclaimed(devices.as_ref(), event).await;
            }
        });
    }

    pub(crate) async fn on_media_acquired(
        &mut self,
        request: u64,
        result: Result<LocalMedia, MediaError>,
        reply: Option<MediaReply>,
    ) {
        let outcome = match result {
            Err(e) => {
                warn!(request, "Media acquisition failed, keeping current media: {}", e);
                if reply.is_none() && request == self.media_request {
                    self.fallback_failure.send_replace(Some(e.clone()));
                }
                Err(SessionError::Media(e))
            }
            Ok(media) if request != self.media_request => {
                info!(request, "Discarding media from a superseded request");
                self.devices.release(&media).await;
                Err(SessionError::Superseded)
            }
            Ok(media) => {
                self.apply_media(media).await;
                Ok(())
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    /// Rebinds every slot to `media` in one step, then releases the old media.
    async fn apply_media(&mut self, media: LocalMedia) {
        let media = Arc::new(media);
        let previous = std::mem::replace(&mut self.media, media.clone());
        self.media_generation += 1;

        let mut failed = Vec::new();
        for slot in self.slots.iter_mut() {
            let replaced = slot.transport().replace_tracks(&media).await;
            match replaced {
                Ok(()) => slot.bind(media.clone()),
                Err(e) => {
                    warn!(peer = %slot.remote(), "Failed to replace tracks: {}", e);
                    failed.push(slot.remote().clone());
                }
            }
        }
        for remote in failed {
            self.close_slot(&remote, CloseReason::NegotiationFailed)
                .await;
        }

        self.devices.release(&previous).await;
        self.fallback_failure
            .send_if_modified(|failure| failure.take().is_some());
        self.watch_local_tracks();
        self.local_media.send_replace(media.clone());
        self.publish_slots();

        info!(
            kind = %media.kind(),
            video = media.video().id(),
            slots = self.slots.len(),
            "Local media replaced"
        );
    }

    /// Watches the published video track. A screen share ended from outside
    /// the session falls back to the camera.
    pub(crate) fn watch_local_tracks(&mut self) {
        if let Some(watch) = self.track_watch.take() {
            watch.abort();
        }
        if self.media.kind() != MediaKind::Screen {
            return;
        }

        let mut ended = self.media.video().ended();
        let generation = self.media_generation;
        let tx = self.event_tx.clone();

        self.track_watch = Some(tokio::spawn(async move {
            if ended.wait_for(|ended| *ended).await.is_ok() {
                let _ = tx.send(SessionEvent::LocalTrackEnded { generation });
            }
        }));
    }

    pub(crate) fn on_local_track_ended(&mut self, generation: u64) {
        if generation != self.media_generation || self.media.kind() != MediaKind::Screen {
            return;
        }
        // Without a reply channel, a failure here is only visible through
        // the fallback_failure watch.
        info!("Screen share ended, falling back to camera");
        self.request_media(MediaKind::Camera, None);
    }
}

/// Releases media from an acquisition the session never applied and tells
/// the requester the session is closed.
pub(crate) async fn release_unclaimed(devices: &dyn MediaDevices, event: SessionEvent) {
    let SessionEvent::MediaAcquired { request, result, reply } = event else {
        return;
    };
    if let Ok(media) = result {
        debug!(request, "Releasing media acquired after teardown");
        devices.release(&media).await;
    }
    if let Some(reply) = reply {
        let _ = reply.send(Err(SessionError::Closed));
    }
}
