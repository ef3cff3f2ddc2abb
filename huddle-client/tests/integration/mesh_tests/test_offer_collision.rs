use crate::integration::init_tracing;
use crate::utils::{
    FakeMediaDevices, FakeTransportFactory, relay_pair, scripted, signal_kinds, wait_until,
};
use huddle_client::{Role, Session, SessionConfig, SlotState};
use huddle_core::{PeerId, RoomId, ServerMessage, SignalPayload};
use std::sync::Arc;
use std::time::Duration;

fn config() -> SessionConfig {
    SessionConfig {
        room: RoomId::from("R"),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_symmetric_discovery_yields_one_offer() {
    init_tracing();
    let (low, high) = (PeerId::new(), PeerId::new());
    assert!(low.initiates_toward(&high));

    let (low_channel, high_channel, link) = relay_pair(&low, &high);
    let (low_transports, high_transports) =
        (FakeTransportFactory::default(), FakeTransportFactory::default());

    let low_session = Session::start(
        config(),
        Arc::new(FakeMediaDevices::default()),
        Arc::new(low_transports.clone()),
        low_channel,
    )
    .await
    .unwrap();
    let high_session = Session::start(
        config(),
        Arc::new(FakeMediaDevices::default()),
        Arc::new(high_transports.clone()),
        high_channel,
    )
    .await
    .unwrap();

    // Both learn about the other from a snapshot at the same moment.
    for (tx, me, other) in [(&link.to_a, &low, &high), (&link.to_b, &high, &low)] {
        tx.send(ServerMessage::Welcome {
            peer_id: me.clone(),
            ice_servers: vec![],
        })
        .unwrap();
        tx.send(ServerMessage::RoomSnapshot {
            room: RoomId::from("R"),
            peers: vec![other.clone()],
        })
        .unwrap();
    }

    wait_until("answer applied", || {
        low_transports
            .wire(&high)
            .is_some_and(|wire| wire.answers_accepted == 1)
    })
    .await;

    let low_slots = low_session.slots();
    let high_slots = high_session.slots();
    assert_eq!(low_slots[&high].role, Role::Initiator);
    assert_eq!(high_slots[&low].role, Role::Responder);

    let low_kinds = signal_kinds(&link.sent_by_a.lock().unwrap());
    let high_kinds = signal_kinds(&link.sent_by_b.lock().unwrap());
    assert_eq!(low_kinds.iter().filter(|k| *k == "offer").count(), 1);
    assert_eq!(high_kinds.iter().filter(|k| *k == "offer").count(), 0);
    assert_eq!(high_kinds.iter().filter(|k| *k == "answer").count(), 1);
}

#[tokio::test]
async fn test_designated_initiator_ignores_colliding_offer() {
    init_tracing();
    let (local, remote) = (PeerId::new(), PeerId::new());
    let (channel, mut server) = scripted();
    let transports = FakeTransportFactory::default();

    let session = Session::start(
        config(),
        Arc::new(FakeMediaDevices::default()),
        Arc::new(transports.clone()),
        channel,
    )
    .await
    .unwrap();

    server.push(ServerMessage::Welcome {
        peer_id: local.clone(),
        ice_servers: vec![],
    });
    server.push(ServerMessage::RoomSnapshot {
        room: RoomId::from("R"),
        peers: vec![remote.clone()],
    });
    wait_until("initiator slot", || session.slots().contains_key(&remote)).await;

    let offer = SignalPayload::Offer {
        sdp: "remote-offer".into(),
    };
    server.push(ServerMessage::Signal {
        from: remote.clone(),
        payload: offer.to_value().unwrap(),
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let kinds = signal_kinds(&server.sent());
    assert!(kinds.contains(&"offer".to_string()));
    assert!(!kinds.contains(&"answer".to_string()));

    assert_eq!(
        session.slots()[&remote].state,
        SlotState::Negotiating(Role::Initiator)
    );
    let wire = transports.wire(&remote).unwrap();
    assert_eq!(wire.offers_accepted, 0);
    assert_eq!(transports.opened_toward(&remote), 1);
}

#[tokio::test]
async fn test_signal_from_stranger_is_dropped() {
    init_tracing();
    let (local, stranger) = (PeerId::new(), PeerId::new());
    let (channel, mut server) = scripted();
    let transports = FakeTransportFactory::default();

    let session = Session::start(
        config(),
        Arc::new(FakeMediaDevices::default()),
        Arc::new(transports.clone()),
        channel,
    )
    .await
    .unwrap();

    server.push(ServerMessage::Welcome {
        peer_id: local,
        ice_servers: vec![],
    });
    server.push(ServerMessage::RoomSnapshot {
        room: RoomId::from("R"),
        peers: vec![],
    });
    server.push(ServerMessage::Signal {
        from: stranger.clone(),
        payload: SignalPayload::Offer { sdp: "x".into() }.to_value().unwrap(),
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(session.slots().is_empty());
    assert_eq!(transports.opened_toward(&stranger), 0);
    assert!(signal_kinds(&server.sent()).is_empty());
}
