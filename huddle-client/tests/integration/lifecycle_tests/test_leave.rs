use crate::integration::{TestNode, connect_pair, init_tracing};
use crate::utils::wait_until;
use huddle_client::{MediaKind, SessionError};
use huddle_core::RoomId;
use huddle_server::SignalingService;

#[tokio::test]
async fn test_leave_tears_down_everything() {
    init_tracing();
    let service = SignalingService::new(vec![]);

    let a = TestNode::join(&service, "R").await;
    let b = TestNode::join(&service, "R").await;
    let c = TestNode::join(&service, "R").await;
    connect_pair(&a, &b).await;
    connect_pair(&a, &c).await;

    a.handle.leave().await;

    assert!(a.handle.slots().is_empty());
    assert!(a.handle.remote_media().borrow().is_empty());
    for remote in [&b, &c] {
        assert!(a.transports.wire(&remote.peer_id).unwrap().closed);
    }
    assert_eq!(a.devices.released(), vec!["camera-1-video".to_string()]);

    for remote in [&b, &c] {
        wait_until("departure observed", || {
            remote.state_toward(&a.peer_id).is_none()
        })
        .await;
        assert!(remote.transports.wire(&a.peer_id).unwrap().closed);
    }
    assert_eq!(
        service.snapshot(&RoomId::from("R")).await.unwrap().len(),
        2
    );

    wait_until("session closed", || a.handle.is_closed()).await;
    // Leaving twice is harmless.
    a.handle.leave().await;
}

#[tokio::test]
async fn test_dropping_all_handles_leaves_room() {
    init_tracing();
    let service = SignalingService::new(vec![]);

    let a = TestNode::join(&service, "R").await;
    let b = TestNode::join(&service, "R").await;
    connect_pair(&a, &b).await;

    let TestNode {
        peer_id: a_id,
        handle,
        devices,
        transports,
    } = a;
    drop(handle);

    wait_until("B sees A leave", || b.state_toward(&a_id).is_none()).await;
    assert!(transports.wire(&b.peer_id).unwrap().closed);
    wait_until("A media released", || devices.released().len() == 1).await;
}

#[tokio::test]
async fn test_leave_releases_media_acquired_afterwards() {
    init_tracing();
    let service = SignalingService::new(vec![]);
    let a = TestNode::join(&service, "R").await;

    let gate = a.devices.hold();
    let handle = a.handle.clone();
    let swap = tokio::spawn(async move { handle.replace_media(MediaKind::Screen).await });
    wait_until("screen acquisition pending", || a.devices.held() == 1).await;

    a.handle.leave().await;
    assert_eq!(a.devices.released(), vec!["camera-1-video".to_string()]);

    gate.add_permits(1);
    assert!(matches!(swap.await.unwrap(), Err(SessionError::Closed)));

    wait_until("late capture released", || a.devices.released().len() == 2).await;
    assert_eq!(a.devices.acquired(), 2);
    assert_eq!(
        a.devices.released(),
        vec!["camera-1-video".to_string(), "screen-2-video".to_string()]
    );
}
