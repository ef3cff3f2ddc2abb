use crate::media::LocalMedia;
use crate::transport::PeerTransport;
use huddle_core::PeerId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// A closed slot is removed from the registry, so it has no state here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Negotiating(Role),
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    RemoteLeft,
    TransportClosed,
    NegotiationFailed,
    NegotiationTimeout,
    Superseded,
    IdentityChanged,
    Teardown,
}

/// Read-only picture of a slot, published to session observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub role: Role,
    pub state: SlotState,
    pub outgoing_audio: String,
    pub outgoing_video: String,
}

/// The local side of the connection toward one remote participant.
pub struct PeerSlot {
    remote: PeerId,
    epoch: u64,
    role: Role,
    state: SlotState,
    transport: Box<dyn PeerTransport>,
    media: Arc<LocalMedia>,
    timer: Option<JoinHandle<()>>,
}

impl PeerSlot {
    pub(crate) fn new(
        remote: PeerId,
        epoch: u64,
        role: Role,
        transport: Box<dyn PeerTransport>,
        media: Arc<LocalMedia>,
    ) -> Self {
        Self {
            remote,
            epoch,
            role,
            state: SlotState::Negotiating(role),
            transport,
            media,
            timer: None,
        }
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn media(&self) -> &Arc<LocalMedia> {
        &self.media
    }

    pub(crate) fn transport(&self) -> &dyn PeerTransport {
        self.transport.as_ref()
    }

    pub(crate) fn arm_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Negotiating -> Connected. Returns false if already connected.
    pub(crate) fn mark_connected(&mut self) -> bool {
        if self.state == SlotState::Connected {
            return false;
        }
        self.state = SlotState::Connected;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        true
    }

    pub(crate) fn bind(&mut self, media: Arc<LocalMedia>) {
        self.media = media;
    }

    pub(crate) async fn close(mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.transport.close().await;
    }

    pub fn view(&self) -> SlotView {
        SlotView {
            role: self.role,
            state: self.state,
            outgoing_audio: self.media.audio().id().to_owned(),
            outgoing_video: self.media.video().id().to_owned(),
        }
    }
}

/// At most one live slot per remote participant.
#[derive(Default)]
pub struct SlotRegistry {
    slots: HashMap<PeerId, PeerSlot>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands the slot back if one already exists for its remote.
    pub(crate) fn insert(&mut self, slot: PeerSlot) -> Result<(), PeerSlot> {
        match self.slots.entry(slot.remote.clone()) {
            Entry::Occupied(_) => Err(slot),
            Entry::Vacant(entry) => {
                entry.insert(slot);
                Ok(())
            }
        }
    }

    pub fn get(&self, remote: &PeerId) -> Option<&PeerSlot> {
        self.slots.get(remote)
    }

    pub(crate) fn get_mut(&mut self, remote: &PeerId) -> Option<&mut PeerSlot> {
        self.slots.get_mut(remote)
    }

    /// True when `epoch` names the slot currently held for `remote`.
    pub fn is_current(&self, remote: &PeerId, epoch: u64) -> bool {
        self.slots
            .get(remote)
            .is_some_and(|slot| slot.epoch == epoch)
    }

    pub fn contains(&self, remote: &PeerId) -> bool {
        self.slots.contains_key(remote)
    }

    pub(crate) fn remove(&mut self, remote: &PeerId) -> Option<PeerSlot> {
        self.slots.remove(remote)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerSlot> {
        self.slots.values_mut()
    }

    pub(crate) fn drain(&mut self) -> Vec<PeerSlot> {
        self.slots.drain().map(|(_, slot)| slot).collect()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.slots.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn views(&self) -> HashMap<PeerId, SlotView> {
        self.slots
            .iter()
            .map(|(peer, slot)| (peer.clone(), slot.view()))
            .collect()
    }
}
