//! Transition functions — the single source of truth for legal order/product
//! state changes, invoked by [`crate::Store::update_order`] inside its one
//! exclusive transaction.
//!
//! Each variant mutates an [`Order`] snapshot and returns the name of the one
//! product it changed, or `None` if it changed no product (including the
//! case where the transition was illegal from the order's current state —
//! the snapshot is then left untouched).

use crate::types::{Order, OrderState, ProductState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Client-initiated cancellation. Legal only from `IN_STORAGE`.
    Cancel,
    /// A robot found `product`. Legal only while the order is temporary and
    /// the product is still `UNDEFINED`.
    Moved(String),
    /// A robot could not find `product`. Same preconditions as `Moved`; also
    /// fails the whole order.
    NotFound(String),
    /// Delivery succeeded. Legal only from `IN_CONVEYOR`.
    Deliver,
    /// Delivery exhausted retries. Legal from any temporary state.
    Fail,
}

impl Transition {
    /// Apply this transition to `order` in place. Returns the product that
    /// changed state, if any.
    pub fn apply(&self, order: &mut Order) -> Option<String> {
        match self {
            Transition::Cancel => {
                if order.state == OrderState::InStorage {
                    order.state = OrderState::Cancelled;
                }
                None
            }
            Transition::Moved(product_name) => {
                if !order.state.is_temporary() {
                    return None;
                }
                let product = order
                    .products
                    .iter_mut()
                    .find(|p| &p.name == product_name && p.state == ProductState::Undefined)?;
                product.state = ProductState::Found;
                let changed = product.name.clone();

                if order.products.iter().all(|p| p.state == ProductState::Found) {
                    order.state = OrderState::InConveyor;
                }
                Some(changed)
            }
            Transition::NotFound(product_name) => {
                if !order.state.is_temporary() {
                    return None;
                }
                let product = order
                    .products
                    .iter_mut()
                    .find(|p| &p.name == product_name && p.state == ProductState::Undefined)?;
                product.state = ProductState::NotFound;
                let changed = product.name.clone();

                order.state = OrderState::Failed;
                Some(changed)
            }
            Transition::Deliver => {
                if order.state == OrderState::InConveyor {
                    order.state = OrderState::Delivered;
                }
                None
            }
            Transition::Fail => {
                if order.state.is_temporary() {
                    order.state = OrderState::Failed;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;

    fn order(state: OrderState, products: &[(&str, ProductState)]) -> Order {
        Order {
            order_id: "order-1".to_string(),
            client_id: "alice".to_string(),
            state,
            products: products
                .iter()
                .map(|(name, state)| Product { name: name.to_string(), state: *state })
                .collect(),
        }
    }

    #[test]
    fn cancel_from_in_storage_succeeds() {
        let mut o = order(OrderState::InStorage, &[("pen", ProductState::Undefined)]);
        let changed = Transition::Cancel.apply(&mut o);
        assert_eq!(o.state, OrderState::Cancelled);
        assert_eq!(changed, None);
    }

    #[test]
    fn cancel_from_in_conveyor_is_illegal() {
        let mut o = order(OrderState::InConveyor, &[("pen", ProductState::Found)]);
        Transition::Cancel.apply(&mut o);
        assert_eq!(o.state, OrderState::InConveyor);
    }

    #[test]
    fn moved_marks_product_found_and_stays_in_storage_if_others_pending() {
        let mut o = order(
            OrderState::InStorage,
            &[("pen", ProductState::Undefined), ("paper", ProductState::Undefined)],
        );
        let changed = Transition::Moved("pen".to_string()).apply(&mut o);
        assert_eq!(changed, Some("pen".to_string()));
        assert_eq!(o.state, OrderState::InStorage);
        assert_eq!(o.products[0].state, ProductState::Found);
    }

    #[test]
    fn moved_transitions_order_to_in_conveyor_when_all_found() {
        let mut o = order(OrderState::InStorage, &[("pen", ProductState::Undefined)]);
        Transition::Moved("pen".to_string()).apply(&mut o);
        assert_eq!(o.state, OrderState::InConveyor);
    }

    #[test]
    fn moved_on_terminal_order_is_absorbed() {
        let mut o = order(OrderState::Cancelled, &[("pen", ProductState::Undefined)]);
        let changed = Transition::Moved("pen".to_string()).apply(&mut o);
        assert_eq!(changed, None);
        assert_eq!(o.products[0].state, ProductState::Undefined);
    }

    #[test]
    fn moved_for_unknown_product_is_absorbed() {
        let mut o = order(OrderState::InStorage, &[("pen", ProductState::Undefined)]);
        let changed = Transition::Moved("stapler".to_string()).apply(&mut o);
        assert_eq!(changed, None);
        assert_eq!(o.state, OrderState::InStorage);
    }

    #[test]
    fn not_found_fails_the_whole_order() {
        let mut o = order(
            OrderState::InStorage,
            &[("pen", ProductState::Undefined), ("paper", ProductState::Undefined)],
        );
        let changed = Transition::NotFound("pen".to_string()).apply(&mut o);
        assert_eq!(changed, Some("pen".to_string()));
        assert_eq!(o.state, OrderState::Failed);
        assert_eq!(o.products[1].state, ProductState::Undefined);
    }

    #[test]
    fn later_moved_after_not_found_is_absorbed() {
        let mut o = order(
            OrderState::InStorage,
            &[("pen", ProductState::Undefined), ("paper", ProductState::Undefined)],
        );
        Transition::NotFound("pen".to_string()).apply(&mut o);
        let changed = Transition::Moved("paper".to_string()).apply(&mut o);
        assert_eq!(changed, None);
        assert_eq!(o.state, OrderState::Failed);
        assert_eq!(o.products[1].state, ProductState::Undefined);
    }

    #[test]
    fn deliver_from_in_conveyor_succeeds() {
        let mut o = order(OrderState::InConveyor, &[("pen", ProductState::Found)]);
        Transition::Deliver.apply(&mut o);
        assert_eq!(o.state, OrderState::Delivered);
    }

    #[test]
    fn deliver_from_in_storage_is_illegal() {
        let mut o = order(OrderState::InStorage, &[("pen", ProductState::Undefined)]);
        Transition::Deliver.apply(&mut o);
        assert_eq!(o.state, OrderState::InStorage);
    }

    #[test]
    fn fail_from_any_temporary_state_succeeds() {
        let mut o = order(OrderState::InConveyor, &[("pen", ProductState::Found)]);
        Transition::Fail.apply(&mut o);
        assert_eq!(o.state, OrderState::Failed);
    }

    #[test]
    fn fail_on_terminal_order_is_absorbed() {
        let mut o = order(OrderState::Delivered, &[("pen", ProductState::Found)]);
        Transition::Fail.apply(&mut o);
        assert_eq!(o.state, OrderState::Delivered);
    }

    #[test]
    fn replaying_moved_after_in_conveyor_is_idempotent() {
        let mut o = order(OrderState::InStorage, &[("pen", ProductState::Undefined)]);
        Transition::Moved("pen".to_string()).apply(&mut o);
        let before = o.clone();
        let changed = Transition::Moved("pen".to_string()).apply(&mut o);
        assert_eq!(changed, None);
        assert_eq!(o, before);
    }
}
