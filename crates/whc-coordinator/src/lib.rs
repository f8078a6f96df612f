//! The Coordinator: per-command handlers that enforce the business rules of
//! §4.2–§4.4, read/mutate the [`whc_store::Store`], and decide what (if
//! anything) to publish back onto the broker.
//!
//! This is the single place business rules are enforced before a mutating
//! Store operation is allowed through — every handler here evaluates its
//! preconditions and only then calls into the Store.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use whc_store::{ClientState, NewOrder, OrderState, Store, Transition};
use whc_wire::{ClientResponse, DeliveryDispatch, MoveCommand, OrderSummaryLine};

/// The outbound surface the Coordinator publishes through. Implemented by
/// the real broker-backed publisher and, in tests, by an in-memory recorder.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish to the per-client queue `<GID><user_id>`.
    async fn send_to_client(&self, uid: &str, body: String);
    /// Publish to the robot queue (`X2R`).
    async fn send_to_robot(&self, body: String);
    /// Publish to the delivery queue (`X2D`).
    async fn send_to_delivery(&self, body: String);
}

pub struct Coordinator<P: Publisher> {
    store: Store,
    publisher: P,
}

impl<P: Publisher> Coordinator<P> {
    pub fn new(store: Store, publisher: P) -> Self {
        Self { store, publisher }
    }

    /// Unwrap back into the underlying store, for shutdown.
    pub fn into_store(self) -> Store {
        self.store
    }

    /// Borrow the publisher, for tests that need to inspect what was sent.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Borrow the store, for tests that need to inspect persisted state
    /// directly rather than through emitted messages.
    pub fn store(&self) -> &Store {
        &self.store
    }

    async fn respond(&self, uid: &str, response: ClientResponse) {
        tracing::debug!(uid, response = %response, "sending client response");
        self.publisher.send_to_client(uid, response.to_string()).await;
    }

    // -----------------------------------------------------------------
    // Client commands (§4.2)
    // -----------------------------------------------------------------

    pub async fn handle_sign_up(&self, uid: &str) -> Result<()> {
        let ok = self.store.register_client(uid).await?;
        tracing::info!(uid, ok, "SIGN_UP");
        self.respond(uid, if ok { ClientResponse::SignedUp } else { ClientResponse::SignUpFailed })
            .await;
        Ok(())
    }

    pub async fn handle_sign_in(&self, uid: &str) -> Result<()> {
        let ok = self.store.update_client(uid, ClientState::SignedIn).await?;
        tracing::info!(uid, ok, "SIGN_IN");
        self.respond(uid, if ok { ClientResponse::SignedIn } else { ClientResponse::SignInFailed })
            .await;
        Ok(())
    }

    pub async fn handle_sign_out(&self, uid: &str) -> Result<()> {
        let ok = self.store.update_client(uid, ClientState::SignedOut).await?;
        tracing::info!(uid, ok, "SIGN_OUT");
        self.respond(
            uid,
            if ok { ClientResponse::SignedOut } else { ClientResponse::SignOutFailed },
        )
        .await;
        Ok(())
    }

    pub async fn handle_request(&self, uid: &str, products: Vec<String>) -> Result<()> {
        let client_state = self.store.get_client_state(uid).await?;
        if client_state != ClientState::SignedIn {
            tracing::info!(uid, "REQUEST rejected: not signed in");
            self.respond(uid, ClientResponse::RequestFailed { order_id: None }).await;
            return Ok(());
        }

        let order_id = Uuid::new_v4().to_string();
        let added = self
            .store
            .add_order(NewOrder {
                order_id: order_id.clone(),
                client_id: uid.to_string(),
                products: products.clone(),
            })
            .await?;

        if !added {
            tracing::warn!(uid, order_id, "REQUEST failed at store layer");
            self.respond(uid, ClientResponse::RequestFailed { order_id: None }).await;
            return Ok(());
        }

        tracing::info!(uid, order_id, ?products, "REQUEST_CREATED");
        self.respond(
            uid,
            ClientResponse::RequestCreated { order_id: order_id.clone(), products: products.clone() },
        )
        .await;

        for product in &products {
            self.publisher
                .send_to_robot(MoveCommand { order_id: order_id.clone(), product: product.clone() }.to_string())
                .await;
        }
        Ok(())
    }

    pub async fn handle_cancel(&self, uid: &str, order_id: &str) -> Result<()> {
        // A malformed order_id can never match a stored UUID; attribute the
        // failure to the caller without touching the Store.
        if Uuid::parse_str(order_id).is_err() {
            tracing::info!(uid, order_id, "CANCEL rejected: malformed order id");
            self.respond(uid, ClientResponse::CancelFailed { order_id: order_id.to_string() }).await;
            return Ok(());
        }

        if self.store.get_client_state(uid).await? != ClientState::SignedIn {
            tracing::info!(uid, order_id, "CANCEL rejected: not signed in");
            self.respond(uid, ClientResponse::CancelFailed { order_id: order_id.to_string() }).await;
            return Ok(());
        }

        let result = self.store.update_order(order_id, Some(uid), Transition::Cancel).await?;
        let cancelled = matches!(&result, Some(order) if order.state == OrderState::Cancelled);

        tracing::info!(uid, order_id, cancelled, "CANCEL");
        self.respond(
            uid,
            if cancelled {
                ClientResponse::Cancelled { order_id: order_id.to_string() }
            } else {
                ClientResponse::CancelFailed { order_id: order_id.to_string() }
            },
        )
        .await;
        Ok(())
    }

    pub async fn handle_view(&self, uid: &str) -> Result<()> {
        if self.store.get_client_state(uid).await? != ClientState::SignedIn {
            tracing::info!(uid, "VIEW rejected: not signed in");
            self.respond(uid, ClientResponse::ViewFailed).await;
            return Ok(());
        }

        let orders = self.store.list_client_orders(uid).await?;
        let lines = orders
            .into_iter()
            .map(|order| OrderSummaryLine {
                order_id: order.order_id,
                products: order.products.into_iter().map(|p| p.name).collect(),
                state: order.state.as_str().to_string(),
            })
            .collect();

        tracing::debug!(uid, "VIEW");
        self.respond(uid, ClientResponse::FoundRequests { lines }).await;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Robot messages (§4.3)
    // -----------------------------------------------------------------

    pub async fn handle_moved(&self, order_id: &str, product: &str) -> Result<()> {
        let result = self
            .store
            .update_order(order_id, None, Transition::Moved(product.to_string()))
            .await?;

        let order = match result {
            Some(o) => o,
            None => {
                tracing::debug!(order_id, product, "MOVED absorbed: no such order");
                return Ok(());
            }
        };

        if order.state == OrderState::InConveyor {
            tracing::info!(order_id, "order reached IN_CONVEYOR, dispatching to delivery");
            let dispatch = DeliveryDispatch {
                client_id: order.client_id,
                order_id: order_id.to_string(),
                products: order.products.into_iter().map(|p| p.name).collect(),
            };
            self.publisher.send_to_delivery(dispatch.to_string()).await;
        }
        Ok(())
    }

    pub async fn handle_not_found(&self, order_id: &str, product: &str) -> Result<()> {
        let result = self
            .store
            .update_order(order_id, None, Transition::NotFound(product.to_string()))
            .await?;

        let order = match result {
            Some(o) => o,
            None => {
                tracing::debug!(order_id, product, "NOT_FOUND absorbed: no such order");
                return Ok(());
            }
        };

        if order.state == OrderState::Failed {
            tracing::info!(order_id, product, "order failed: product not found");
            self.publisher
                .send_to_client(
                    &order.client_id,
                    ClientResponse::RequestFailed { order_id: Some(order_id.to_string()) }.to_string(),
                )
                .await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Delivery messages (§4.4)
    // -----------------------------------------------------------------

    pub async fn handle_delivered(&self, order_id: &str) -> Result<()> {
        let result = self.store.update_order(order_id, None, Transition::Deliver).await?;
        match result {
            Some(order) if order.state == OrderState::Delivered => {
                tracing::info!(order_id, "order delivered");
            }
            Some(_) => tracing::debug!(order_id, "DELIVERED absorbed: order not IN_CONVEYOR"),
            None => tracing::debug!(order_id, "DELIVERED absorbed: no such order"),
        }
        Ok(())
    }

    pub async fn handle_delivery_failed(&self, order_id: &str) -> Result<()> {
        let result = self.store.update_order(order_id, None, Transition::Fail).await?;

        let order = match result {
            Some(o) if o.state == OrderState::Failed => o,
            Some(_) => {
                tracing::debug!(order_id, "DELIVERY_FAILED absorbed: order not temporary");
                return Ok(());
            }
            None => {
                tracing::debug!(order_id, "DELIVERY_FAILED absorbed: no such order");
                return Ok(());
            }
        };

        tracing::info!(order_id, "delivery failed, notifying client");
        self.publisher
            .send_to_client(
                &order.client_id,
                ClientResponse::RequestFailed { order_id: Some(order_id.to_string()) }.to_string(),
            )
            .await;
        Ok(())
    }
}
