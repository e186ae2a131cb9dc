//! The order record.

use chrono::{DateTime, Utc};
use common::{Cid, Money, OrderId};
use serde::{Deserialize, Serialize};
use store::{OrderDocument, Version};

use super::{
    BuyerSnapshot, ChangedBy, DeliveryAddress, OrderError, OrderSource, OrderStatus,
    ProductSnapshot, Quantity, StatusChange, Transition, TransitionDetails, TransporterSnapshot,
};
use crate::checkpoint::CheckpointCode;
use crate::identity::Principal;

/// Everything needed to place an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub buyer: BuyerSnapshot,
    pub product: ProductSnapshot,
    pub quantity: Quantity,
    pub checkpoint: CheckpointCode,
    pub source: OrderSource,
    pub delivery_address: Option<DeliveryAddress>,
    pub placed_by: ChangedBy,
    pub placed_at: DateTime<Utc>,
}

/// One purchase of one product.
///
/// Buyer, product, quantity, price, checkpoint and delivery address are fixed
/// at creation. Only the status, the transporter assignment and the status
/// history change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    buyer: BuyerSnapshot,
    product: ProductSnapshot,
    quantity: Quantity,
    total_price: Money,
    checkpoint: CheckpointCode,
    source: OrderSource,
    status: OrderStatus,
    #[serde(default)]
    transporter: Option<TransporterSnapshot>,
    #[serde(default)]
    delivery_address: Option<DeliveryAddress>,
    status_history: Vec<StatusChange>,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order in the `placed` status.
    pub fn place(new: NewOrder) -> Result<Self, OrderError> {
        if !new.product.price.is_positive() {
            return Err(OrderError::InvalidPrice {
                price: new.product.price.cents(),
            });
        }

        let total_price = new
            .product
            .price
            .checked_multiply(new.quantity.get())
            .ok_or(OrderError::TotalOverflow {
                price: new.product.price.cents(),
                quantity: new.quantity.get(),
            })?;
        Ok(Self {
            id: new.id,
            buyer: new.buyer,
            product: new.product,
            quantity: new.quantity,
            total_price,
            checkpoint: new.checkpoint,
            source: new.source,
            status: OrderStatus::Placed,
            transporter: None,
            delivery_address: new.delivery_address,
            status_history: vec![StatusChange {
                status: OrderStatus::Placed,
                changed_by: new.placed_by,
                at: new.placed_at,
                notes: None,
            }],
            created_at: new.placed_at,
        })
    }

    /// Applies a transition after checking the current status allows it.
    ///
    /// The caller is expected to have authorized `actor` first. On error the
    /// order is left untouched.
    pub fn apply(
        &mut self,
        transition: Transition,
        actor: &Principal,
        details: &TransitionDetails,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let allowed = match transition {
            Transition::Confirm => self.status.can_confirm(),
            Transition::Ship => self.status.can_ship(),
            Transition::AcceptForTransport => {
                self.status.can_accept_for_transport() && self.transporter.is_none()
            }
            Transition::PickUp => self.status.can_pick_up(),
            Transition::Deliver => match self.transporter {
                Some(_) => self.status.can_deliver_by_transporter(),
                None => self.status.can_deliver_directly(),
            },
            Transition::Cancel => self.status.can_cancel(),
        };
        if !allowed {
            return Err(OrderError::InvalidTransition {
                current: self.status,
                action: transition.action(),
            });
        }

        if transition == Transition::AcceptForTransport {
            self.transporter = Some(actor.transporter_snapshot(
                details.transporter_name.as_deref(),
                details.transporter_phone.as_deref(),
            ));
        }

        self.status = transition.target();
        self.status_history.push(StatusChange {
            status: self.status,
            changed_by: actor.changed_by(),
            at,
            notes: details
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        });
        Ok(())
    }

    /// Serializes the order into a storable document.
    pub fn to_document(&self, version: Version) -> Result<OrderDocument, serde_json::Error> {
        Ok(OrderDocument {
            order_id: self.id,
            buyer: self.buyer.cid.clone(),
            seller: self.product.seller.clone(),
            transporter: self.transporter.as_ref().map(|t| t.cid.clone()),
            status: self.status.as_str().to_string(),
            version,
            created_at: self.created_at,
            payload: serde_json::to_value(self)?,
        })
    }

    /// Restores an order from its stored document.
    pub fn from_document(doc: &OrderDocument) -> Result<Self, serde_json::Error> {
        serde_json::from_value(doc.payload.clone())
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn buyer(&self) -> &BuyerSnapshot {
        &self.buyer
    }

    pub fn product(&self) -> &ProductSnapshot {
        &self.product
    }

    /// Returns the CID of the product's seller.
    pub fn seller(&self) -> &Cid {
        &self.product.seller
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Returns the price charged, fixed at creation.
    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn checkpoint(&self) -> &CheckpointCode {
        &self.checkpoint
    }

    pub fn source(&self) -> OrderSource {
        self.source
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn transporter(&self) -> Option<&TransporterSnapshot> {
        self.transporter.as_ref()
    }

    pub fn delivery_address(&self) -> Option<&DeliveryAddress> {
        self.delivery_address.as_ref()
    }

    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use common::ProductId;

    fn principal(cid: &str, role: Role) -> Principal {
        Principal {
            cid: Cid::parse(cid).unwrap(),
            role,
            name: format!("user-{cid}"),
            phone_number: "17111111".to_string(),
            location: "Thimphu".to_string(),
            dzongkhag: "Thimphu".to_string(),
        }
    }

    fn placed(price_cents: i64, quantity: i64) -> Result<Order, OrderError> {
        let buyer = principal("11111111111", Role::Consumer);
        Order::place(NewOrder {
            id: OrderId::new(),
            buyer: buyer.buyer_snapshot(),
            product: ProductSnapshot {
                product_id: ProductId::new(),
                name: "Red rice".to_string(),
                price: Money::from_cents(price_cents),
                unit: "kg".to_string(),
                seller: Cid::parse("22222222222").unwrap(),
                image: String::new(),
            },
            quantity: Quantity::new(quantity)?,
            checkpoint: CheckpointCode {
                payload: "{}".to_string(),
                image: "<svg/>".to_string(),
            },
            source: OrderSource::SingleBuy,
            delivery_address: None,
            placed_by: buyer.changed_by(),
            placed_at: Utc::now(),
        })
    }

    #[test]
    fn test_place_computes_total_once() {
        let order = placed(12_550, 4).unwrap();
        assert_eq!(order.status(), OrderStatus::Placed);
        assert_eq!(order.total_price(), Money::from_cents(50_200));
        assert_eq!(order.status_history().len(), 1);
        assert_eq!(order.status_history()[0].status, OrderStatus::Placed);
        assert!(order.transporter().is_none());
    }

    #[test]
    fn test_place_rejects_free_products() {
        assert_eq!(
            placed(0, 1).unwrap_err(),
            OrderError::InvalidPrice { price: 0 }
        );
    }

    #[test]
    fn test_place_rejects_overflowing_totals() {
        let price = i64::MAX / 2;
        assert_eq!(
            placed(price, 3).unwrap_err(),
            OrderError::TotalOverflow { price, quantity: 3 }
        );
    }

    #[test]
    fn test_full_transport_path() {
        let mut order = placed(1_000, 2).unwrap();
        let seller = principal("22222222222", Role::Farmer);
        let transporter = principal("33333333333", Role::Transporter);
        let none = TransitionDetails::default();
        let now = Utc::now();

        order.apply(Transition::Confirm, &seller, &none, now).unwrap();
        order.apply(Transition::Ship, &seller, &none, now).unwrap();
        let details = TransitionDetails {
            transporter_phone: Some("17999999".to_string()),
            ..Default::default()
        };
        order
            .apply(Transition::AcceptForTransport, &transporter, &details, now)
            .unwrap();
        let assigned = order.transporter().unwrap();
        assert_eq!(assigned.cid, transporter.cid);
        assert_eq!(assigned.phone_number, "17999999");

        order.apply(Transition::PickUp, &transporter, &none, now).unwrap();
        order.apply(Transition::Deliver, &transporter, &none, now).unwrap();

        assert_eq!(order.status(), OrderStatus::Delivered);
        let statuses: Vec<_> = order.status_history().iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Placed,
                OrderStatus::Confirmed,
                OrderStatus::Shipped,
                OrderStatus::OutForDelivery,
                OrderStatus::PickedUp,
                OrderStatus::Delivered,
            ]
        );
    }

    #[test]
    fn test_direct_delivery_requires_no_transporter() {
        let seller = principal("22222222222", Role::Farmer);
        let transporter = principal("33333333333", Role::Transporter);
        let none = TransitionDetails::default();
        let now = Utc::now();

        let mut direct = placed(1_000, 1).unwrap();
        direct.apply(Transition::Confirm, &seller, &none, now).unwrap();
        direct.apply(Transition::Ship, &seller, &none, now).unwrap();
        direct.apply(Transition::Deliver, &seller, &none, now).unwrap();
        assert_eq!(direct.status(), OrderStatus::Delivered);

        let mut carried = placed(1_000, 1).unwrap();
        carried.apply(Transition::Confirm, &seller, &none, now).unwrap();
        carried.apply(Transition::Ship, &seller, &none, now).unwrap();
        carried
            .apply(Transition::AcceptForTransport, &transporter, &none, now)
            .unwrap();
        let err = carried
            .apply(Transition::Deliver, &transporter, &none, now)
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                current: OrderStatus::OutForDelivery,
                action: "deliver",
            }
        );
    }

    #[test]
    fn test_rejected_transition_leaves_order_untouched() {
        let mut order = placed(1_000, 1).unwrap();
        let before = order.clone();
        let seller = principal("22222222222", Role::Farmer);

        let result = order.apply(
            Transition::Deliver,
            &seller,
            &TransitionDetails::default(),
            Utc::now(),
        );
        assert!(result.is_err());
        assert_eq!(order, before);
    }

    #[test]
    fn test_cancel_notes_recorded() {
        let mut order = placed(1_000, 1).unwrap();
        let buyer = principal("11111111111", Role::Consumer);
        order
            .apply(
                Transition::Cancel,
                &buyer,
                &TransitionDetails::with_notes("  changed my mind "),
                Utc::now(),
            )
            .unwrap();
        let last = order.status_history().last().unwrap();
        assert_eq!(last.status, OrderStatus::Cancelled);
        assert_eq!(last.notes.as_deref(), Some("changed my mind"));
        assert_eq!(last.changed_by.role, Role::Consumer);
    }

    #[test]
    fn test_document_round_trip() {
        let order = placed(4_500, 3).unwrap();
        let doc = order.to_document(Version::first()).unwrap();
        assert_eq!(doc.status, "placed");
        assert_eq!(doc.seller.as_str(), "22222222222");
        assert!(doc.transporter.is_none());
        assert_eq!(doc.payload["totalPrice"], 13_500);
        assert_eq!(Order::from_document(&doc).unwrap(), order);
    }
}
