//! Idempotence laws: replaying the same inbound message leaves the store
//! bit-identical after the first successful application, matching the
//! at-least-once delivery guarantee the broker provides.

use whc_testkit::TestRig;

#[tokio::test]
async fn replaying_moved_after_delivery_does_not_change_anything() {
    let rig = TestRig::new().await;
    let c = &rig.coordinator;

    c.handle_sign_up("alice").await.unwrap();
    c.handle_sign_in("alice").await.unwrap();
    c.handle_request("alice", vec!["pen".to_string()]).await.unwrap();
    let order_id =
        rig.publisher().robot_messages()[0].split_whitespace().nth(1).unwrap().to_string();

    c.handle_moved(&order_id, "pen").await.unwrap();
    c.handle_delivered(&order_id).await.unwrap();
    let after_first = c.store().get_order(&order_id).await.unwrap().unwrap();

    c.handle_moved(&order_id, "pen").await.unwrap();
    let after_replay = c.store().get_order(&order_id).await.unwrap().unwrap();

    assert_eq!(after_first, after_replay);
    assert!(rig.publisher().delivery_messages().len() == 1);
}

#[tokio::test]
async fn registering_the_same_client_twice_yields_one_row() {
    let rig = TestRig::new().await;
    let c = &rig.coordinator;

    c.handle_sign_up("alice").await.unwrap();
    c.handle_sign_up("alice").await.unwrap();

    let orders = c.store().list_client_orders("alice").await.unwrap();
    assert!(orders.is_empty());
    assert_eq!(
        rig.publisher().client_messages_for("alice"),
        vec!["SIGNED_UP".to_string(), "SIGN_UP_FAILED".to_string()],
    );
}

#[tokio::test]
async fn cancel_replayed_after_success_does_not_change_order_state() {
    let rig = TestRig::new().await;
    let c = &rig.coordinator;

    c.handle_sign_up("alice").await.unwrap();
    c.handle_sign_in("alice").await.unwrap();
    c.handle_request("alice", vec!["pen".to_string()]).await.unwrap();
    let order_id =
        rig.publisher().robot_messages()[0].split_whitespace().nth(1).unwrap().to_string();

    c.handle_cancel("alice", &order_id).await.unwrap();
    let after_first = c.store().get_order(&order_id).await.unwrap().unwrap();

    c.handle_cancel("alice", &order_id).await.unwrap();
    let after_replay = c.store().get_order(&order_id).await.unwrap().unwrap();

    assert_eq!(after_first, after_replay);
    assert_eq!(
        rig.publisher().client_messages_for("alice").iter().filter(|m| m.starts_with("CANCELLED")).count(),
        2,
        "a no-op transition still re-confirms cancellation to an at-least-once client"
    );
}
