//! Checkout inputs.

use common::ProductId;
use domain::DeliveryAddress;
use serde::{Deserialize, Serialize};
use store::CartLine;
use uuid::Uuid;

/// One product and the quantity requested, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl CheckoutLine {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

impl From<CartLine> for CheckoutLine {
    fn from(line: CartLine) -> Self {
        Self::new(line.product_id, i64::from(line.quantity))
    }
}

/// Where the orders of a checkout should be delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressChoice {
    /// An address given with the request.
    Inline(DeliveryAddress),
    /// An entry of the buyer's address book.
    Saved(Uuid),
    /// The buyer's default address, if any.
    #[default]
    Default,
}
