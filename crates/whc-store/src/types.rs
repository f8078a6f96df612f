//! Domain types: client/product/order state enums and the Order aggregate.

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    NotRegistered,
    SignedOut,
    SignedIn,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::NotRegistered => "NOT_REGISTERED",
            ClientState::SignedOut => "SIGNED_OUT",
            ClientState::SignedIn => "SIGNED_IN",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "NOT_REGISTERED" => Ok(ClientState::NotRegistered),
            "SIGNED_OUT" => Ok(ClientState::SignedOut),
            "SIGNED_IN" => Ok(ClientState::SignedIn),
            other => Err(anyhow!("invalid client state: {}", other)),
        }
    }

    /// `true` iff `(self, new)` is one of the legal client transitions.
    pub fn can_transition_to(&self, new: ClientState) -> bool {
        matches!(
            (self, new),
            (ClientState::NotRegistered, ClientState::SignedOut)
                | (ClientState::SignedOut, ClientState::SignedIn)
                | (ClientState::SignedIn, ClientState::SignedOut)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductState {
    Undefined,
    Found,
    NotFound,
}

impl ProductState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductState::Undefined => "UNDEFINED",
            ProductState::Found => "FOUND",
            ProductState::NotFound => "NOT_FOUND",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "UNDEFINED" => Ok(ProductState::Undefined),
            "FOUND" => Ok(ProductState::Found),
            "NOT_FOUND" => Ok(ProductState::NotFound),
            other => Err(anyhow!("invalid product state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub state: ProductState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    InStorage,
    InConveyor,
    Delivered,
    Cancelled,
    Failed,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::InStorage => "IN_STORAGE",
            OrderState::InConveyor => "IN_CONVEYOR",
            OrderState::Delivered => "DELIVERED",
            OrderState::Cancelled => "CANCELLED",
            OrderState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "IN_STORAGE" => Ok(OrderState::InStorage),
            "IN_CONVEYOR" => Ok(OrderState::InConveyor),
            "DELIVERED" => Ok(OrderState::Delivered),
            "CANCELLED" => Ok(OrderState::Cancelled),
            "FAILED" => Ok(OrderState::Failed),
            other => Err(anyhow!("invalid order state: {}", other)),
        }
    }

    /// `IN_STORAGE` and `IN_CONVEYOR` are the only mutable states; the rest
    /// are terminal.
    pub fn is_temporary(&self) -> bool {
        matches!(self, OrderState::InStorage | OrderState::InConveyor)
    }
}

/// An order and its line-item products, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_id: String,
    pub client_id: String,
    pub products: Vec<Product>,
    pub state: OrderState,
}

/// A fresh, unpersisted order ready for [`crate::Store::add_order`].
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: String,
    pub client_id: String,
    pub products: Vec<String>,
}
