use crate::integration::{TestNode, connect_pair, init_tracing};
use huddle_client::{Role, SlotState};
use huddle_server::SignalingService;

#[tokio::test]
async fn test_three_participants_form_full_mesh() {
    init_tracing();
    let service = SignalingService::new(vec![]);

    let a = TestNode::join(&service, "R").await;
    let b = TestNode::join(&service, "R").await;
    let c = TestNode::join(&service, "R").await;

    connect_pair(&a, &b).await;
    connect_pair(&a, &c).await;
    connect_pair(&b, &c).await;

    for node in [&a, &b, &c] {
        let slots = node.handle.slots();
        assert_eq!(slots.len(), 2);
        assert!(slots.values().all(|view| view.state == SlotState::Connected));
    }

    // Ids are issued in connect order, so earlier joiners initiate.
    assert_eq!(a.role_toward(&b.peer_id), Some(Role::Initiator));
    assert_eq!(a.role_toward(&c.peer_id), Some(Role::Initiator));
    assert_eq!(b.role_toward(&c.peer_id), Some(Role::Initiator));
    assert_eq!(c.role_toward(&a.peer_id), Some(Role::Responder));

    for (node, remote) in [(&a, &b), (&a, &c), (&b, &c), (&c, &a)] {
        assert_eq!(node.transports.opened_toward(&remote.peer_id), 1);
    }
}
