//! Domain error types.

use common::OrderId;
use store::StoreError;
use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::identity::IdentityError;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The order rejected the operation.
    #[error("{0}")]
    Order(#[from] OrderError),

    /// The acting identity could not be resolved.
    #[error("{0}")]
    Identity(#[from] IdentityError),

    /// A checkpoint code could not be produced or read.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// Order not found, or not visible to the caller.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Another request changed the order between load and save.
    #[error("Order {0} was modified concurrently")]
    ConcurrentModification(OrderId),

    /// The request is malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
