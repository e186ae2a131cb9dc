//! Inventory ledger: the only writer of product stock.

use common::ProductId;
use store::{ProductStore, StockUpdate, StoreError};
use thiserror::Error;

/// Stock held for one order attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Stock left on the product right after this reservation.
    pub remaining: u32,
}

/// Errors from [`InventoryLedger::reserve`].
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Fewer units remain than were requested. Nothing was changed.
    #[error("Insufficient stock for product {product_id}: {available} available")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
    },

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Reserves and releases product stock.
///
/// Reservations go through the store's conditional decrement, so concurrent
/// callers can never jointly take more than the stock on hand.
#[derive(Clone)]
pub struct InventoryLedger<S: ProductStore> {
    store: S,
}

impl<S: ProductStore> InventoryLedger<S> {
    /// Creates a ledger over a product store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Atomically takes `quantity` units of a product.
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation, LedgerError> {
        match self.store.decrement_stock(product_id, quantity).await? {
            StockUpdate::Applied { remaining } => {
                metrics::counter!("stock_reservations_total").increment(1);
                tracing::debug!(remaining, "Stock reserved");
                Ok(Reservation {
                    product_id,
                    quantity,
                    remaining,
                })
            }
            StockUpdate::Insufficient { available } => {
                metrics::counter!("stock_reservation_conflicts_total").increment(1);
                tracing::info!(available, "Reservation rejected, insufficient stock");
                Err(LedgerError::InsufficientStock {
                    product_id,
                    available,
                })
            }
            StockUpdate::Missing => Err(LedgerError::ProductNotFound(product_id)),
        }
    }

    /// Puts `quantity` units back on a product and reports whether it did.
    ///
    /// Never fails: a release compensates for something that already went
    /// wrong, so a failure here is logged and counted but not retried.
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn release(&self, product_id: ProductId, quantity: u32) -> bool {
        match self.store.increment_stock(product_id, quantity).await {
            Ok(stock) => {
                metrics::counter!("stock_releases_total").increment(1);
                tracing::debug!(stock, "Stock released");
                true
            }
            Err(e) => {
                metrics::counter!("stock_release_failures_total").increment(1);
                tracing::error!(error = %e, quantity, "Failed to release reserved stock");
                false
            }
        }
    }
}
