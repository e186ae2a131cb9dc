//! The order record and its lifecycle.

mod entity;
mod status;
mod transition;
mod value_objects;

pub use entity::{NewOrder, Order};
pub use status::OrderStatus;
pub use transition::{Transition, TransitionDetails};
pub use value_objects::{
    BuyerSnapshot, ChangedBy, DeliveryAddress, OrderSource, ProductSnapshot, Quantity,
    StatusChange, TransporterSnapshot,
};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Quantity outside the accepted range.
    #[error("Invalid quantity: {quantity} (must be between 1 and {max})", max = Quantity::MAX)]
    InvalidQuantity { quantity: i64 },

    /// The product snapshot carries a non-positive price.
    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: i64 },

    /// Price times quantity does not fit in a money amount.
    #[error("Order total overflows: {price} x {quantity}")]
    TotalOverflow { price: i64, quantity: u32 },

    /// The caller may not perform this action on the order.
    #[error("Not permitted to {action}")]
    Forbidden { action: &'static str },

    /// The order's current status does not allow the action.
    #[error("Cannot {action} an order with status {current}")]
    InvalidTransition {
        current: OrderStatus,
        action: &'static str,
    },
}
