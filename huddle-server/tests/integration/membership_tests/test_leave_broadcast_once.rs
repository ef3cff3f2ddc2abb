use huddle_core::{PeerId, ServerMessage};
use huddle_server::{RoomCommand, SignalingService};
use tokio::sync::oneshot;

use crate::integration::{create_test_room, init_tracing};
use crate::utils::TestParticipant;

#[tokio::test]
async fn test_disconnect_broadcasts_single_departure() {
    init_tracing();

    let service = SignalingService::new(vec![]);
    let mut a = TestParticipant::connect(&service).await.unwrap();
    let mut b = TestParticipant::connect(&service).await.unwrap();
    let mut c = TestParticipant::connect(&service).await.unwrap();

    for participant in [&a, &b, &c] {
        participant.join("R");
    }
    a.drain().await;
    b.drain().await;
    c.drain().await;

    a.disconnect();
    a.disconnect();

    for observer in [&mut b, &mut c] {
        let departures: Vec<_> = observer
            .drain()
            .await
            .into_iter()
            .filter(|msg| matches!(msg, ServerMessage::PeerLeft { peer_id } if *peer_id == a.peer_id))
            .collect();
        assert_eq!(departures.len(), 1);
    }

    let mut late = TestParticipant::connect(&service).await.unwrap();
    late.join("R");
    let snapshot = late.expect_snapshot().await.unwrap();
    assert!(!snapshot.contains(&a.peer_id));
    assert_eq!(snapshot, vec![b.peer_id.clone(), c.peer_id.clone()]);
}

#[tokio::test]
async fn test_explicit_leave_keeps_channel_open() {
    init_tracing();

    let service = SignalingService::new(vec![]);
    let mut a = TestParticipant::connect(&service).await.unwrap();
    let mut b = TestParticipant::connect(&service).await.unwrap();
    a.join("R");
    b.join("R");
    a.drain().await;
    b.drain().await;

    a.send(huddle_core::ClientMessage::LeaveRoom);
    a.send(huddle_core::ClientMessage::LeaveRoom);

    let departures = b
        .drain()
        .await
        .into_iter()
        .filter(|msg| matches!(msg, ServerMessage::PeerLeft { .. }))
        .count();
    assert_eq!(departures, 1);
    assert!(service.is_connected(&a.peer_id));

    a.join("R");
    assert_eq!(a.expect_snapshot().await.unwrap(), vec![b.peer_id.clone()]);
}

#[tokio::test]
async fn test_departure_reaches_remaining_members_only() {
    init_tracing();

    let (room_cmd_tx, signaling) = create_test_room();
    let peers: Vec<PeerId> = (0..3).map(|_| PeerId::new()).collect();

    for peer in &peers {
        room_cmd_tx
            .send(RoomCommand::Join {
                peer_id: peer.clone(),
            })
            .expect("Room died");
    }
    for _ in 0..2 {
        room_cmd_tx
            .send(RoomCommand::Leave {
                peer_id: peers[0].clone(),
            })
            .expect("Room died");
    }

    let (reply, rx) = oneshot::channel();
    room_cmd_tx
        .send(RoomCommand::Snapshot { reply })
        .expect("Room died");
    assert_eq!(rx.await.expect("No snapshot"), peers[1..].to_vec());

    let mut recipients = signaling.left_recipients(&peers[0]).await;
    recipients.sort();
    let mut remaining = peers[1..].to_vec();
    remaining.sort();
    assert_eq!(recipients, remaining);

    let leaver_log = signaling.delivered_to(&peers[0]).await;
    assert!(matches!(
        leaver_log.first(),
        Some(ServerMessage::RoomSnapshot { peers, .. }) if peers.is_empty()
    ));
    assert!(
        leaver_log
            .iter()
            .all(|msg| !matches!(msg, ServerMessage::PeerLeft { .. }))
    );
}
