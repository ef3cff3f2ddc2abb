pub mod mesh_tests;

use std::sync::Arc;
use tracing::Level;

use huddle_client::{Role, Session, SessionConfig, SessionHandle, SlotState};
use huddle_core::{PeerId, RoomId};
use huddle_server::SignalingService;

use crate::utils::{FakeMediaDevices, FakeTransportFactory, attach, wait_until};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// One participant: a running session plus the fakes behind it.
pub struct TestNode {
    pub peer_id: PeerId,
    pub handle: SessionHandle,
    pub devices: FakeMediaDevices,
    pub transports: FakeTransportFactory,
}

impl TestNode {
    pub async fn join(service: &SignalingService, room: &str) -> Self {
        Self::join_with(service, room, FakeMediaDevices::default(), FakeTransportFactory::default())
            .await
    }

    pub async fn join_with(
        service: &SignalingService,
        room: &str,
        devices: FakeMediaDevices,
        transports: FakeTransportFactory,
    ) -> Self {
        let (peer_id, channel) = attach(service);
        let config = SessionConfig {
            room: RoomId::from(room),
            ..Default::default()
        };

        let handle = Session::start(
            config,
            Arc::new(devices.clone()),
            Arc::new(transports.clone()),
            channel,
        )
        .await
        .expect("Session failed to start");

        let expected = peer_id.clone();
        wait_until("identity", || handle.local_peer_id().as_ref() == Some(&expected)).await;
        let room = RoomId::from(room);
        wait_until("room membership", || service.room_of(&peer_id) == Some(room.clone())).await;

        Self {
            peer_id,
            handle,
            devices,
            transports,
        }
    }

    pub fn state_toward(&self, remote: &PeerId) -> Option<SlotState> {
        self.handle.slots().get(remote).map(|view| view.state)
    }

    pub fn role_toward(&self, remote: &PeerId) -> Option<Role> {
        self.handle.slots().get(remote).map(|view| view.role)
    }

    pub fn outgoing_video_toward(&self, remote: &PeerId) -> Option<String> {
        self.handle
            .slots()
            .get(remote)
            .map(|view| view.outgoing_video.clone())
    }
}

/// Waits for both slots of the pair to exist, then drives them to Connected.
pub async fn connect_pair(a: &TestNode, b: &TestNode) {
    wait_until("slots on both sides", || {
        a.state_toward(&b.peer_id).is_some() && b.state_toward(&a.peer_id).is_some()
    })
    .await;

    a.transports.establish(&b.peer_id);
    b.transports.establish(&a.peer_id);

    wait_until("both sides connected", || {
        a.state_toward(&b.peer_id) == Some(SlotState::Connected)
            && b.state_toward(&a.peer_id) == Some(SlotState::Connected)
    })
    .await;
}
