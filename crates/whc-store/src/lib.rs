//! Durable store: a single SQLite file holding clients, orders, and their
//! line-item products.
//!
//! Every public method here takes the store's one exclusive lock for its
//! full duration — the read, the transition decision, and the write commit
//! all happen while holding it. No two store operations ever interleave.
//! This is what makes the per-order state machine safe under three
//! concurrent intake consumers (see the workspace-level design notes).

mod transition;
mod types;

pub use transition::Transition;
pub use types::{ClientState, NewOrder, Order, OrderState, Product, ProductState};

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

pub const ENV_DB_PATH: &str = "WHC_DATABASE_PATH";

/// The durable store. Cheaply cloneable; the lock is internal.
pub struct Store {
    pool: Mutex<SqlitePool>,
}

impl Store {
    /// Open (creating if absent) the SQLite file at `db_path` and run
    /// embedded migrations.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let url = format!("sqlite://{db_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .with_context(|| format!("failed to open store at {db_path}"))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("store migration failed")?;

        Ok(Self { pool: Mutex::new(pool) })
    }

    /// Returns `NOT_REGISTERED` if `uid` is absent.
    pub async fn get_client_state(&self, uid: &str) -> Result<ClientState> {
        let pool = self.pool.lock().await;
        Self::fetch_client_state(&pool, uid).await
    }

    async fn fetch_client_state(pool: &SqlitePool, uid: &str) -> Result<ClientState> {
        let row = sqlx::query("select client_state from clients where user_id = ?")
            .bind(uid)
            .fetch_optional(pool)
            .await
            .context("get_client_state query failed")?;

        match row {
            None => Ok(ClientState::NotRegistered),
            Some(row) => {
                let state: String = row.try_get("client_state")?;
                ClientState::parse(&state)
            }
        }
    }

    /// Succeeds iff `uid` is currently absent.
    pub async fn register_client(&self, uid: &str) -> Result<bool> {
        let pool = self.pool.lock().await;
        let current = Self::fetch_client_state(&pool, uid).await?;
        if current != ClientState::NotRegistered {
            return Ok(false);
        }

        sqlx::query("insert into clients (user_id, client_state) values (?, ?) on conflict(user_id) do nothing")
            .bind(uid)
            .bind(ClientState::SignedOut.as_str())
            .execute(&*pool)
            .await
            .context("register_client insert failed")?;

        Ok(true)
    }

    /// Succeeds iff `(current, new_state)` is a legal client transition.
    pub async fn update_client(&self, uid: &str, new_state: ClientState) -> Result<bool> {
        let pool = self.pool.lock().await;
        let current = Self::fetch_client_state(&pool, uid).await?;
        if !current.can_transition_to(new_state) {
            return Ok(false);
        }

        sqlx::query("update clients set client_state = ? where user_id = ?")
            .bind(new_state.as_str())
            .bind(uid)
            .execute(&*pool)
            .await
            .context("update_client write failed")?;

        Ok(true)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        let pool = self.pool.lock().await;
        Self::fetch_order(&pool, order_id).await
    }

    async fn fetch_order(pool: &SqlitePool, order_id: &str) -> Result<Option<Order>> {
        let order_row = sqlx::query("select user_id, req_state from orders where order_id = ?")
            .bind(order_id)
            .fetch_optional(pool)
            .await
            .context("get_order query failed")?;

        let order_row = match order_row {
            Some(r) => r,
            None => return Ok(None),
        };

        let client_id: String = order_row.try_get("user_id")?;
        let req_state: String = order_row.try_get("req_state")?;

        let product_rows = sqlx::query(
            "select name, prod_state from order_products where order_id = ? order by position asc",
        )
        .bind(order_id)
        .fetch_all(pool)
        .await
        .context("get_order products query failed")?;

        let mut products = Vec::with_capacity(product_rows.len());
        for row in product_rows {
            let name: String = row.try_get("name")?;
            let state: String = row.try_get("prod_state")?;
            products.push(Product { name, state: ProductState::parse(&state)? });
        }

        Ok(Some(Order {
            order_id: order_id.to_string(),
            client_id,
            products,
            state: OrderState::parse(&req_state)?,
        }))
    }

    /// Succeeds iff `order.order_id` is unused and the owning client is
    /// `SIGNED_IN`.
    pub async fn add_order(&self, order: NewOrder) -> Result<bool> {
        let pool = self.pool.lock().await;

        let client_state = Self::fetch_client_state(&pool, &order.client_id).await?;
        if client_state != ClientState::SignedIn {
            return Ok(false);
        }

        let existing = sqlx::query("select 1 from orders where order_id = ?")
            .bind(&order.order_id)
            .fetch_optional(&*pool)
            .await
            .context("add_order existence check failed")?;
        if existing.is_some() {
            return Ok(false);
        }

        let mut tx = pool.begin().await.context("add_order begin failed")?;

        sqlx::query("insert into orders (order_id, user_id, req_state) values (?, ?, ?)")
            .bind(&order.order_id)
            .bind(&order.client_id)
            .bind(OrderState::InStorage.as_str())
            .execute(&mut *tx)
            .await
            .context("add_order insert order failed")?;

        for (position, name) in order.products.iter().enumerate() {
            sqlx::query(
                "insert into order_products (order_id, position, name, prod_state) values (?, ?, ?, ?)",
            )
            .bind(&order.order_id)
            .bind(position as i64)
            .bind(name)
            .bind(ProductState::Undefined.as_str())
            .execute(&mut *tx)
            .await
            .context("add_order insert product failed")?;
        }

        tx.commit().await.context("add_order commit failed")?;
        Ok(true)
    }

    /// Atomically reads the order, applies `transition` to the in-memory
    /// snapshot, and writes back the resulting order state and (if one
    /// changed) the modified product's new state.
    ///
    /// Returns `Ok(None)` if the order does not exist, or if `owner` is
    /// given and does not match the order's `client_id` — in both cases
    /// without side effects. Returns `Ok(Some(order))` with the
    /// post-transition snapshot otherwise, even if the transition itself
    /// was a no-op (illegal from the current state).
    pub async fn update_order(
        &self,
        order_id: &str,
        owner: Option<&str>,
        transition: Transition,
    ) -> Result<Option<Order>> {
        let pool = self.pool.lock().await;

        let mut order = match Self::fetch_order(&pool, order_id).await? {
            Some(o) => o,
            None => return Ok(None),
        };

        if let Some(owner) = owner {
            if order.client_id != owner {
                return Ok(None);
            }
        }

        let changed_product = transition.apply(&mut order);

        let mut tx = pool.begin().await.context("update_order begin failed")?;

        sqlx::query("update orders set req_state = ? where order_id = ?")
            .bind(order.state.as_str())
            .bind(order_id)
            .execute(&mut *tx)
            .await
            .context("update_order write order state failed")?;

        if let Some(product_name) = &changed_product {
            let new_state = order
                .products
                .iter()
                .find(|p| &p.name == product_name)
                .expect("changed product must still be present in snapshot")
                .state;

            sqlx::query(
                "update order_products set prod_state = ? where order_id = ? and name = ?",
            )
            .bind(new_state.as_str())
            .bind(order_id)
            .bind(product_name)
            .execute(&mut *tx)
            .await
            .context("update_order write product state failed")?;
        }

        tx.commit().await.context("update_order commit failed")?;
        Ok(Some(order))
    }

    pub async fn list_client_orders(&self, uid: &str) -> Result<Vec<Order>> {
        let pool = self.pool.lock().await;

        let rows = sqlx::query("select order_id from orders where user_id = ?")
            .bind(uid)
            .fetch_all(&*pool)
            .await
            .context("list_client_orders query failed")?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order_id: String = row.try_get("order_id")?;
            if let Some(order) = Self::fetch_order(&pool, &order_id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    pub async fn close(self) {
        self.pool.into_inner().close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("whc.db");
        let store = Store::connect(path.to_str().expect("utf8 path"))
            .await
            .expect("connect");
        (store, dir)
    }

    #[tokio::test]
    async fn unknown_client_is_not_registered() {
        let (store, _dir) = test_store().await;
        assert_eq!(
            store.get_client_state("alice").await.unwrap(),
            ClientState::NotRegistered
        );
    }

    #[tokio::test]
    async fn register_client_is_idempotent() {
        let (store, _dir) = test_store().await;
        assert!(store.register_client("alice").await.unwrap());
        assert!(!store.register_client("alice").await.unwrap());
        assert_eq!(store.get_client_state("alice").await.unwrap(), ClientState::SignedOut);
    }

    #[tokio::test]
    async fn update_client_enforces_legal_transitions() {
        let (store, _dir) = test_store().await;
        store.register_client("alice").await.unwrap();

        assert!(store.update_client("alice", ClientState::SignedIn).await.unwrap());
        assert!(!store.update_client("alice", ClientState::SignedIn).await.unwrap());
        assert!(store.update_client("alice", ClientState::SignedOut).await.unwrap());
    }

    #[tokio::test]
    async fn add_order_requires_signed_in_owner() {
        let (store, _dir) = test_store().await;
        store.register_client("alice").await.unwrap();

        let new_order = NewOrder {
            order_id: "order-1".to_string(),
            client_id: "alice".to_string(),
            products: vec!["pen".to_string()],
        };
        assert!(!store.add_order(new_order.clone()).await.unwrap());

        store.update_client("alice", ClientState::SignedIn).await.unwrap();
        assert!(store.add_order(new_order.clone()).await.unwrap());
        assert!(!store.add_order(new_order).await.unwrap());
    }

    #[tokio::test]
    async fn round_trip_preserves_product_order() {
        let (store, _dir) = test_store().await;
        store.register_client("alice").await.unwrap();
        store.update_client("alice", ClientState::SignedIn).await.unwrap();

        store
            .add_order(NewOrder {
                order_id: "order-1".to_string(),
                client_id: "alice".to_string(),
                products: vec!["pen".to_string(), "paper".to_string(), "stapler".to_string()],
            })
            .await
            .unwrap();

        let order = store.get_order("order-1").await.unwrap().unwrap();
        let names: Vec<&str> = order.products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["pen", "paper", "stapler"]);
    }

    #[tokio::test]
    async fn update_order_rejects_owner_mismatch_without_side_effects() {
        let (store, _dir) = test_store().await;
        store.register_client("alice").await.unwrap();
        store.update_client("alice", ClientState::SignedIn).await.unwrap();
        store
            .add_order(NewOrder {
                order_id: "order-1".to_string(),
                client_id: "alice".to_string(),
                products: vec!["pen".to_string()],
            })
            .await
            .unwrap();

        let result = store
            .update_order("order-1", Some("bob"), Transition::Cancel)
            .await
            .unwrap();
        assert!(result.is_none());

        let order = store.get_order("order-1").await.unwrap().unwrap();
        assert_eq!(order.state, OrderState::InStorage);
    }

    #[tokio::test]
    async fn moved_persists_product_and_order_state() {
        let (store, _dir) = test_store().await;
        store.register_client("alice").await.unwrap();
        store.update_client("alice", ClientState::SignedIn).await.unwrap();
        store
            .add_order(NewOrder {
                order_id: "order-1".to_string(),
                client_id: "alice".to_string(),
                products: vec!["pen".to_string()],
            })
            .await
            .unwrap();

        let order = store
            .update_order("order-1", None, Transition::Moved("pen".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.state, OrderState::InConveyor);

        let reloaded = store.get_order("order-1").await.unwrap().unwrap();
        assert_eq!(reloaded.state, OrderState::InConveyor);
        assert_eq!(reloaded.products[0].state, ProductState::Found);
    }

    #[tokio::test]
    async fn terminal_order_is_never_mutated_again() {
        let (store, _dir) = test_store().await;
        store.register_client("alice").await.unwrap();
        store.update_client("alice", ClientState::SignedIn).await.unwrap();
        store
            .add_order(NewOrder {
                order_id: "order-1".to_string(),
                client_id: "alice".to_string(),
                products: vec!["pen".to_string()],
            })
            .await
            .unwrap();

        store.update_order("order-1", Some("alice"), Transition::Cancel).await.unwrap();
        let after_cancel = store.get_order("order-1").await.unwrap().unwrap();
        assert_eq!(after_cancel.state, OrderState::Cancelled);

        store
            .update_order("order-1", None, Transition::Moved("pen".to_string()))
            .await
            .unwrap();
        let unchanged = store.get_order("order-1").await.unwrap().unwrap();
        assert_eq!(unchanged, after_cancel);
    }

    #[tokio::test]
    async fn list_client_orders_returns_only_that_clients_orders() {
        let (store, _dir) = test_store().await;
        for uid in ["alice", "bob"] {
            store.register_client(uid).await.unwrap();
            store.update_client(uid, ClientState::SignedIn).await.unwrap();
        }
        store
            .add_order(NewOrder {
                order_id: "order-1".to_string(),
                client_id: "alice".to_string(),
                products: vec!["pen".to_string()],
            })
            .await
            .unwrap();
        store
            .add_order(NewOrder {
                order_id: "order-2".to_string(),
                client_id: "bob".to_string(),
                products: vec!["paper".to_string()],
            })
            .await
            .unwrap();

        let alice_orders = store.list_client_orders("alice").await.unwrap();
        assert_eq!(alice_orders.len(), 1);
        assert_eq!(alice_orders[0].order_id, "order-1");
    }
}
