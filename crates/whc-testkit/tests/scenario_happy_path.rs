//! Scenario 1: sign up, sign in, request a single product, robot finds it,
//! delivery succeeds.

use whc_testkit::TestRig;

#[tokio::test]
async fn happy_path_delivers_single_product_order() {
    let rig = TestRig::new().await;
    let c = &rig.coordinator;

    c.handle_sign_up("alice").await.unwrap();
    c.handle_sign_in("alice").await.unwrap();
    c.handle_request("alice", vec!["pen".to_string()]).await.unwrap();

    let robot_sent = rig.publisher().robot_messages();
    assert_eq!(robot_sent.len(), 1);
    let order_id = robot_sent[0].split_whitespace().nth(1).unwrap().to_string();
    assert_eq!(robot_sent[0], format!("MOVE {order_id} pen"));

    c.handle_moved(&order_id, "pen").await.unwrap();
    assert_eq!(rig.publisher().delivery_messages(), vec![format!("DELIVERY alice {order_id} pen")]);

    c.handle_delivered(&order_id).await.unwrap();

    let order = c.store().get_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.state, whc_store::OrderState::Delivered);

    let client_sent = rig.publisher().client_messages_for("alice");
    assert!(client_sent.contains(&"SIGNED_UP".to_string()));
    assert!(client_sent.contains(&"SIGNED_IN".to_string()));
    assert!(client_sent.iter().any(|m| m.starts_with("REQUEST_CREATED")));
}
