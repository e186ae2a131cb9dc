//! Fulfillment service: status transitions and role-scoped order views.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use common::{Cid, OrderId};
use serde::Serialize;
use store::{MarketStore, OrderDocument, OrderQuery, StoreError, UserRecord};

use crate::checkpoint::CheckpointGenerator;
use crate::error::DomainError;
use crate::guard::{authorize, can_view};
use crate::identity::Principal;
use crate::ledger::InventoryLedger;
use crate::order::{Order, OrderError, OrderStatus, Transition, TransitionDetails};

/// Live contact details of a marketplace participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub cid: Cid,
    pub name: String,
    pub phone_number: String,
    pub location: String,
    pub dzongkhag: String,
}

impl From<&UserRecord> for Contact {
    fn from(user: &UserRecord) -> Self {
        Self {
            cid: user.cid.clone(),
            name: user.name.clone(),
            phone_number: user.phone_number.clone(),
            location: user.location.clone(),
            dzongkhag: user.dzongkhag.clone(),
        }
    }
}

/// An order as its buyer sees it, with the seller's current contact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseView {
    #[serde(flatten)]
    pub order: Order,
    pub seller: Option<Contact>,
}

/// A shipped order matching a transporter's route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportCandidate {
    #[serde(flatten)]
    pub order: Order,
    pub seller: Option<Contact>,
    pub buyer: Option<Contact>,
}

/// Service for moving orders through fulfillment.
///
/// Every transition runs as load, authorize, apply, then a version-guarded
/// save. If two requests race on the same order the loser's save fails and
/// nothing it did is kept.
#[derive(Clone)]
pub struct FulfillmentService<S: MarketStore> {
    store: S,
    ledger: InventoryLedger<S>,
}

impl<S: MarketStore> FulfillmentService<S> {
    /// Creates a new fulfillment service over the given store.
    pub fn new(store: S) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies a transition on behalf of `principal`.
    ///
    /// Cancelling releases the order's quantity back to the product.
    #[tracing::instrument(skip(self, principal, details), fields(cid = %principal.cid, transition = %transition))]
    pub async fn transition(
        &self,
        principal: &Principal,
        order_id: OrderId,
        transition: Transition,
        details: TransitionDetails,
    ) -> Result<Order, DomainError> {
        let doc = self.load(order_id).await?;
        let mut order = Order::from_document(&doc)?;

        let checked = authorize(principal, &order, transition)
            .and_then(|_| order.apply(transition, principal, &details, Utc::now()));
        if let Err(e) = checked {
            let reason = match e {
                OrderError::Forbidden { .. } => "forbidden",
                _ => "invalid_transition",
            };
            metrics::counter!("order_transitions_rejected_total", "reason" => reason)
                .increment(1);
            tracing::info!(error = %e, "Transition rejected");
            return Err(e.into());
        }

        let updated = order.to_document(doc.version)?;
        match self.store.update_order(updated, doc.version).await {
            Ok(version) => tracing::debug!(%version, "Order saved"),
            Err(StoreError::ConcurrencyConflict { .. }) => {
                metrics::counter!("order_transitions_rejected_total", "reason" => "conflict")
                    .increment(1);
                return Err(DomainError::ConcurrentModification(order_id));
            }
            Err(e) => return Err(e.into()),
        }

        if transition == Transition::Cancel {
            self.ledger
                .release(order.product().product_id, order.quantity().get())
                .await;
        }

        metrics::counter!("order_transitions_total", "transition" => transition.as_str())
            .increment(1);
        tracing::info!(%order_id, status = %order.status(), "Order transitioned");
        Ok(order)
    }

    /// Seller confirms a placed order.
    pub async fn confirm(&self, principal: &Principal, order_id: OrderId) -> Result<Order, DomainError> {
        self.transition(principal, order_id, Transition::Confirm, TransitionDetails::default())
            .await
    }

    /// Seller ships a confirmed order.
    pub async fn ship(&self, principal: &Principal, order_id: OrderId) -> Result<Order, DomainError> {
        self.transition(principal, order_id, Transition::Ship, TransitionDetails::default())
            .await
    }

    /// Transporter accepts a shipped order, optionally overriding its contact details.
    pub async fn accept_for_transport(
        &self,
        principal: &Principal,
        order_id: OrderId,
        name: Option<String>,
        phone_number: Option<String>,
    ) -> Result<Order, DomainError> {
        let details = TransitionDetails {
            transporter_name: name,
            transporter_phone: phone_number,
            ..Default::default()
        };
        self.transition(principal, order_id, Transition::AcceptForTransport, details)
            .await
    }

    /// Assigned transporter picks the produce up.
    pub async fn pick_up(&self, principal: &Principal, order_id: OrderId) -> Result<Order, DomainError> {
        self.transition(principal, order_id, Transition::PickUp, TransitionDetails::default())
            .await
    }

    /// Marks an order delivered.
    pub async fn deliver(&self, principal: &Principal, order_id: OrderId) -> Result<Order, DomainError> {
        self.transition(principal, order_id, Transition::Deliver, TransitionDetails::default())
            .await
    }

    /// Buyer cancels a placed order and its stock is restored.
    pub async fn cancel(
        &self,
        principal: &Principal,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order, DomainError> {
        let details = TransitionDetails {
            notes: reason,
            ..Default::default()
        };
        self.transition(principal, order_id, Transition::Cancel, details)
            .await
    }

    /// Loads an order visible to `principal`.
    ///
    /// Orders the principal may not see are reported as not found.
    #[tracing::instrument(skip(self, principal), fields(cid = %principal.cid))]
    pub async fn get(&self, principal: &Principal, order_id: OrderId) -> Result<Order, DomainError> {
        let order = Order::from_document(&self.load(order_id).await?)?;
        if !can_view(principal, &order) {
            return Err(DomainError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    /// Resolves a scanned checkpoint code to its order.
    pub async fn scan(&self, principal: &Principal, code: &str) -> Result<Order, DomainError> {
        let payload = CheckpointGenerator::decode(code)?;
        self.get(principal, payload.order_id).await
    }

    /// Orders placed by the principal, with each seller's contact.
    #[tracing::instrument(skip(self, principal), fields(cid = %principal.cid))]
    pub async fn purchases(&self, principal: &Principal) -> Result<Vec<PurchaseView>, DomainError> {
        let orders = self
            .query(OrderQuery::for_buyer(principal.cid.clone()))
            .await?;
        let sellers = self
            .contacts(orders.iter().map(|o| o.seller().clone()))
            .await?;

        Ok(orders
            .into_iter()
            .map(|order| {
                let seller = sellers.get(order.seller()).cloned();
                PurchaseView { order, seller }
            })
            .collect())
    }

    /// Orders for products the principal sells.
    pub async fn sales(&self, principal: &Principal) -> Result<Vec<Order>, DomainError> {
        self.query(OrderQuery::for_seller(principal.cid.clone()))
            .await
    }

    /// Shipped orders no transporter has accepted yet.
    pub async fn awaiting_transport(&self, principal: &Principal) -> Result<Vec<Order>, DomainError> {
        require_transporter(principal, "list shipped orders")?;
        self.query(OrderQuery::new().status(OrderStatus::Shipped.as_str()).unassigned())
            .await
    }

    /// Orders the principal has accepted for transport.
    pub async fn transports(&self, principal: &Principal) -> Result<Vec<Order>, DomainError> {
        require_transporter(principal, "list transports")?;
        self.query(OrderQuery::for_transporter(principal.cid.clone()))
            .await
    }

    /// Shipped, unassigned orders going from one dzongkhag to any of several.
    ///
    /// The destination is the order's delivery address, or the buyer's
    /// profile dzongkhag when the order has none.
    #[tracing::instrument(skip(self, principal), fields(cid = %principal.cid))]
    pub async fn transport_search(
        &self,
        principal: &Principal,
        from: &str,
        to: &[String],
    ) -> Result<Vec<TransportCandidate>, DomainError> {
        require_transporter(principal, "search transports")?;

        let from = from.trim();
        let to: Vec<&str> = to
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .collect();
        if from.is_empty() || to.is_empty() {
            return Err(DomainError::InvalidInput(
                "Missing from or to dzongkhag(s)".to_string(),
            ));
        }

        let orders = self
            .query(OrderQuery::new().status(OrderStatus::Shipped.as_str()).unassigned())
            .await?;
        let contacts = self
            .contacts(
                orders
                    .iter()
                    .flat_map(|o| [o.seller().clone(), o.buyer().cid.clone()]),
            )
            .await?;

        let mut matches = Vec::new();
        for order in orders {
            let seller = contacts.get(order.seller()).cloned();
            let buyer = contacts.get(&order.buyer().cid).cloned();

            if seller.as_ref().map(|s| s.dzongkhag.as_str()) != Some(from) {
                continue;
            }
            let destination = order
                .delivery_address()
                .map(|a| a.dzongkhag.as_str())
                .or(buyer.as_ref().map(|b| b.dzongkhag.as_str()))
                .unwrap_or_default();
            if !to.contains(&destination) {
                continue;
            }

            matches.push(TransportCandidate {
                order,
                seller,
                buyer,
            });
        }

        tracing::debug!(count = matches.len(), "Transport search complete");
        Ok(matches)
    }

    async fn load(&self, order_id: OrderId) -> Result<OrderDocument, DomainError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    async fn query(&self, query: OrderQuery) -> Result<Vec<Order>, DomainError> {
        let docs = self.store.query_orders(query).await?;
        let orders = docs
            .iter()
            .map(Order::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    async fn contacts(
        &self,
        cids: impl Iterator<Item = Cid>,
    ) -> Result<HashMap<Cid, Contact>, DomainError> {
        let unique: Vec<Cid> = cids.collect::<HashSet<_>>().into_iter().collect();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }
        let users = self.store.get_users(&unique).await?;
        Ok(users
            .iter()
            .map(|u| (u.cid.clone(), Contact::from(u)))
            .collect())
    }
}

fn require_transporter(principal: &Principal, action: &'static str) -> Result<(), OrderError> {
    if principal.role.is_transporter() {
        Ok(())
    } else {
        Err(OrderError::Forbidden { action })
    }
}
