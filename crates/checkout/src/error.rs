//! Checkout error types.

use common::ProductId;
use domain::{CheckpointError, OrderError};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// A line that asks for more than the product has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockShortfall {
    pub product_id: ProductId,
    pub name: String,
    pub requested: u32,
    pub available: u32,
}

/// Errors that can occur during checkout.
///
/// Every variant except `Persistence`, `Checkpoint`, `Serialization` and
/// `Interrupted` is raised before any stock is taken or after all of it was
/// given back.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A line's quantity is outside the accepted range.
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity {
        product_id: ProductId,
        quantity: i64,
    },

    /// The buyer's cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A batch checkout named no products.
    #[error("No products to order")]
    NoItems,

    /// A line names a product that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The chosen saved address does not exist.
    #[error("Address not found: {0}")]
    AddressNotFound(Uuid),

    /// Live stock cannot cover one or more lines. Nothing was reserved.
    #[error("Insufficient stock for some items")]
    InsufficientStock(Vec<StockShortfall>),

    /// Stock ran out between the pre-check and the reservation. Every
    /// reservation already made was released.
    #[error("Insufficient stock due to concurrent updates")]
    StockRace {
        product_id: ProductId,
        available: u32,
    },

    /// The order could not be built.
    #[error("{0}")]
    Order(#[from] OrderError),

    /// A checkpoint code could not be generated.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// The store failed.
    #[error("Failed to store orders: {0}")]
    Persistence(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The checkout task ended without producing a result.
    #[error("Checkout interrupted: {0}")]
    Interrupted(String),
}

impl CheckoutError {
    /// Stable label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::InvalidQuantity { .. }
            | CheckoutError::EmptyCart
            | CheckoutError::NoItems => "invalid_input",
            CheckoutError::Order(
                OrderError::InvalidPrice { .. } | OrderError::TotalOverflow { .. },
            ) => "bad_product",
            CheckoutError::Order(_) => "invalid_input",
            CheckoutError::ProductNotFound(_) | CheckoutError::AddressNotFound(_) => "not_found",
            CheckoutError::InsufficientStock(_) => "insufficient_stock",
            CheckoutError::StockRace { .. } => "stock_race",
            CheckoutError::Checkpoint(_)
            | CheckoutError::Persistence(_)
            | CheckoutError::Serialization(_)
            | CheckoutError::Interrupted(_) => "internal",
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
