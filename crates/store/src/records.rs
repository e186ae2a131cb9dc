//! Record types exchanged with the store.

use chrono::{DateTime, Utc};
use common::{Cid, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Version;

/// A catalog product as the order engine sees it.
///
/// Catalog management owns every field except `stock_quantity`, which is
/// only ever changed through [`crate::ProductStore::decrement_stock`] and
/// [`crate::ProductStore::increment_stock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub unit: String,
    pub stock_quantity: u32,
    /// CID of the account that listed the product.
    pub seller: Cid,
    /// Encoded product image, empty when none was uploaded.
    pub image: String,
}

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockUpdate {
    /// Stock was decremented; `remaining` is the stock after the write.
    Applied { remaining: u32 },
    /// Stock was left untouched because fewer than the requested units remain.
    Insufficient { available: u32 },
    /// No product with that ID exists.
    Missing,
}

/// A user profile from the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub cid: Cid,
    pub name: String,
    pub phone_number: String,
    pub location: String,
    pub dzongkhag: String,
    /// Role exactly as stored; parsed into a typed role at resolution time.
    pub role: String,
}

/// An entry in a user's address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: Uuid,
    pub owner: Cid,
    pub title: String,
    pub place: String,
    pub dzongkhag: String,
    pub is_default: bool,
}

/// One line of a buyer's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A persisted order.
///
/// The participant columns and `status` are indexed copies of what the
/// payload holds so that role-scoped listings can be answered without
/// decoding every order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDocument {
    pub order_id: OrderId,
    pub buyer: Cid,
    pub seller: Cid,
    pub transporter: Option<Cid>,
    pub status: String,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    /// The serialized order entity.
    pub payload: serde_json::Value,
}
