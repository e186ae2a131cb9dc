//! Value objects for the order record.

use chrono::{DateTime, Utc};
use common::{Cid, Money, ProductId};
use serde::{Deserialize, Serialize};
use store::{AddressRecord, ProductRecord};

use super::{OrderError, OrderStatus};
use crate::identity::Role;

/// Number of units ordered, between 1 and [`Quantity::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest quantity a single order line may carry.
    pub const MAX: u32 = 999;

    /// Validates a requested quantity.
    pub fn new(quantity: i64) -> Result<Self, OrderError> {
        match u32::try_from(quantity) {
            Ok(q) if (1..=Self::MAX).contains(&q) => Ok(Self(q)),
            _ => Err(OrderError::InvalidQuantity { quantity }),
        }
    }

    /// Returns the quantity as a plain integer.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Quantity {
    type Error = OrderError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which checkout path created an order. Audit only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderSource {
    SingleBuy,
    Cart,
    Batch,
}

impl OrderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSource::SingleBuy => "single-buy",
            OrderSource::Cart => "cart",
            OrderSource::Batch => "batch",
        }
    }
}

impl std::fmt::Display for OrderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The buyer as they were when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerSnapshot {
    pub cid: Cid,
    pub name: String,
    pub phone_number: String,
    pub location: String,
}

/// The product as it was listed when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub unit: String,
    pub seller: Cid,
    pub image: String,
}

impl From<&ProductRecord> for ProductSnapshot {
    fn from(product: &ProductRecord) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            unit: product.unit.clone(),
            seller: product.seller.clone(),
            image: product.image.clone(),
        }
    }
}

/// The transporter who accepted the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransporterSnapshot {
    pub cid: Cid,
    pub name: String,
    pub phone_number: String,
}

/// Where the order is to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub title: String,
    pub place: String,
    pub dzongkhag: String,
}

impl From<AddressRecord> for DeliveryAddress {
    fn from(address: AddressRecord) -> Self {
        Self {
            title: address.title,
            place: address.place,
            dzongkhag: address.dzongkhag,
        }
    }
}

/// Who made a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedBy {
    pub cid: Cid,
    pub role: Role,
    pub name: String,
}

/// One entry of an order's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: OrderStatus,
    pub changed_by: ChangedBy,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
