//! Scenario 2: one product of a multi-product order comes back NOT_FOUND;
//! the order fails immediately and a later MOVED for the other product is
//! absorbed.

use whc_testkit::TestRig;

#[tokio::test]
async fn not_found_fails_order_and_absorbs_later_moved() {
    let rig = TestRig::new().await;
    let c = &rig.coordinator;

    c.handle_sign_up("alice").await.unwrap();
    c.handle_sign_in("alice").await.unwrap();
    c.handle_request("alice", vec!["pen".to_string(), "paper".to_string()]).await.unwrap();

    let robot_sent = rig.publisher().robot_messages();
    assert_eq!(robot_sent.len(), 2);
    let order_id = robot_sent[0].split_whitespace().nth(1).unwrap().to_string();

    c.handle_not_found(&order_id, "pen").await.unwrap();

    let order = c.store().get_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.state, whc_store::OrderState::Failed);

    let client_sent = rig.publisher().client_messages_for("alice");
    assert!(client_sent.contains(&format!("REQUEST_FAILED {order_id}")));

    c.handle_moved(&order_id, "paper").await.unwrap();
    let order = c.store().get_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.state, whc_store::OrderState::Failed);
    assert!(rig.publisher().delivery_messages().is_empty());
}
