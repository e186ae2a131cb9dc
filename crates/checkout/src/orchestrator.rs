//! Checkout orchestrator: single-buy, cart and batch checkout.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{
    BuyerSnapshot, CheckpointGenerator, CheckpointPayload, DeliveryAddress, InventoryLedger,
    LedgerError, NewOrder, Order, OrderSource, Principal, ProductSnapshot, Quantity,
};
use serde::Serialize;
use store::{MarketStore, OrderDocument, ProductRecord, Version};
use tracing::Instrument;

use crate::error::{CheckoutError, Result, StockShortfall};
use crate::request::{AddressChoice, CheckoutLine};
use crate::saga::{Compensation, ReservationSaga};

/// Stock left on a product after one line's reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingStock {
    pub product_id: ProductId,
    pub remaining: u32,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    /// One order per line, in line order.
    pub orders: Vec<Order>,
    /// Remaining stock per line, as returned by each reservation.
    pub remaining_stock: Vec<RemainingStock>,
    /// True if the buyer's cart was emptied.
    pub cart_cleared: bool,
}

/// Turns purchase intents into stored, stock-backed orders.
///
/// Every entry point runs the same procedure: validate, pre-check stock,
/// reserve line by line, build orders with checkpoint codes, persist all of
/// them at once. Failures after the first reservation release everything
/// that was reserved before returning.
///
/// Each attempt runs on a spawned task. Dropping the future returned by an
/// entry point stops the wait, not the attempt: it still ends with stored
/// orders or with its reservations released.
#[derive(Clone)]
pub struct CheckoutOrchestrator<S: MarketStore> {
    store: S,
    ledger: InventoryLedger<S>,
    checkpoints: CheckpointGenerator,
}

impl<S: MarketStore> CheckoutOrchestrator<S> {
    /// Creates an orchestrator that renders checkpoints as QR codes.
    pub fn new(store: S) -> Self {
        Self::with_checkpoints(store, CheckpointGenerator::default())
    }

    /// Creates an orchestrator with a specific checkpoint generator.
    pub fn with_checkpoints(store: S, checkpoints: CheckpointGenerator) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
            checkpoints,
        }
    }

    /// Buys one product.
    #[tracing::instrument(skip(self, principal, address), fields(cid = %principal.cid))]
    pub async fn buy_now(
        &self,
        principal: &Principal,
        product_id: ProductId,
        quantity: i64,
        address: AddressChoice,
    ) -> Result<CheckoutReceipt> {
        let started = Instant::now();
        let result = self
            .place(
                principal,
                vec![CheckoutLine::new(product_id, quantity)],
                OrderSource::SingleBuy,
                address,
            )
            .await;
        record(OrderSource::SingleBuy, started, &result);
        result
    }

    /// Orders every line of the buyer's cart, then empties the cart.
    ///
    /// A cart that cannot be cleared afterwards does not fail the checkout;
    /// the receipt reports it instead.
    #[tracing::instrument(skip(self, principal, address), fields(cid = %principal.cid))]
    pub async fn checkout_cart(
        &self,
        principal: &Principal,
        address: AddressChoice,
    ) -> Result<CheckoutReceipt> {
        let started = Instant::now();
        let result = self.place_cart(principal, address).await;
        record(OrderSource::Cart, started, &result);
        result
    }

    /// Orders an explicit list of products.
    #[tracing::instrument(skip(self, principal, lines, address), fields(cid = %principal.cid))]
    pub async fn checkout_batch(
        &self,
        principal: &Principal,
        lines: Vec<CheckoutLine>,
        address: AddressChoice,
    ) -> Result<CheckoutReceipt> {
        let started = Instant::now();
        let result = if lines.is_empty() {
            Err(CheckoutError::NoItems)
        } else {
            self.place(principal, lines, OrderSource::Batch, address)
                .await
        };
        record(OrderSource::Batch, started, &result);
        result
    }

    async fn place_cart(
        &self,
        principal: &Principal,
        address: AddressChoice,
    ) -> Result<CheckoutReceipt> {
        let cart = self.store.get_cart(&principal.cid).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let lines = cart.into_iter().map(CheckoutLine::from).collect();

        let mut receipt = self
            .place(principal, lines, OrderSource::Cart, address)
            .await?;

        match self.store.clear_cart(&principal.cid).await {
            Ok(()) => receipt.cart_cleared = true,
            Err(e) => tracing::warn!(error = %e, "Failed to clear cart after checkout"),
        }
        Ok(receipt)
    }

    async fn place(
        &self,
        principal: &Principal,
        lines: Vec<CheckoutLine>,
        source: OrderSource,
        address: AddressChoice,
    ) -> Result<CheckoutReceipt> {
        let this = self.clone();
        let principal = principal.clone();
        let attempt = async move { this.attempt(&principal, lines, source, address).await };

        tokio::spawn(attempt.in_current_span())
            .await
            .map_err(|e| CheckoutError::Interrupted(e.to_string()))?
    }

    #[tracing::instrument(
        skip(self, principal, lines, address),
        fields(source = %source, lines = lines.len())
    )]
    async fn attempt(
        &self,
        principal: &Principal,
        lines: Vec<CheckoutLine>,
        source: OrderSource,
        address: AddressChoice,
    ) -> Result<CheckoutReceipt> {
        // 1. Validate quantities
        let mut validated = Vec::with_capacity(lines.len());
        for line in &lines {
            let quantity =
                Quantity::new(line.quantity).map_err(|_| CheckoutError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                })?;
            validated.push((line.product_id, quantity));
        }

        // 2. Load products
        let mut seen = HashSet::new();
        let ids: Vec<ProductId> = validated
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| seen.insert(*id))
            .collect();
        let products: HashMap<ProductId, ProductRecord> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        if let Some(missing) = ids.iter().find(|id| !products.contains_key(*id)) {
            return Err(CheckoutError::ProductNotFound(*missing));
        }

        // 3. Pre-check live stock, summing lines for the same product
        let mut requested: HashMap<ProductId, u32> = HashMap::new();
        for (id, quantity) in &validated {
            *requested.entry(*id).or_default() += quantity.get();
        }
        let shortfalls: Vec<StockShortfall> = ids
            .iter()
            .filter_map(|id| {
                let product = products.get(id)?;
                let wanted = *requested.get(id)?;
                (product.stock_quantity < wanted).then(|| StockShortfall {
                    product_id: *id,
                    name: product.name.clone(),
                    requested: wanted,
                    available: product.stock_quantity,
                })
            })
            .collect();
        if !shortfalls.is_empty() {
            return Err(CheckoutError::InsufficientStock(shortfalls));
        }

        // 4. Resolve snapshots
        let buyer = principal.buyer_snapshot();
        let delivery_address = self.resolve_address(principal, address).await?;

        // 5. Reserve line by line
        let mut saga = ReservationSaga::new(&self.ledger);
        for (id, quantity) in &validated {
            if let Err(e) = saga.reserve(*id, quantity.get()).await {
                unwind(saga).await;
                return Err(match e {
                    LedgerError::InsufficientStock {
                        product_id,
                        available,
                    } => CheckoutError::StockRace {
                        product_id,
                        available,
                    },
                    LedgerError::ProductNotFound(id) => CheckoutError::ProductNotFound(id),
                    LedgerError::Store(e) => CheckoutError::Persistence(e),
                });
            }
        }

        // 6. Build orders and checkpoint codes
        let built = self.build_orders(
            principal,
            &buyer,
            &products,
            &validated,
            source,
            delivery_address,
            Utc::now(),
        );
        let (orders, docs) = match built {
            Ok(built) => built,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build orders after reserving stock");
                unwind(saga).await;
                return Err(e);
            }
        };

        // 7. Persist
        if let Err(e) = self.store.insert_orders(docs).await {
            tracing::error!(error = %e, "Failed to store orders after reserving stock");
            unwind(saga).await;
            return Err(CheckoutError::Persistence(e));
        }

        let remaining_stock = saga
            .complete()
            .into_iter()
            .map(|r| RemainingStock {
                product_id: r.product_id,
                remaining: r.remaining,
            })
            .collect();

        Ok(CheckoutReceipt {
            orders,
            remaining_stock,
            cart_cleared: false,
        })
    }

    /// Resolves the delivery address: inline, then saved, then the default.
    async fn resolve_address(
        &self,
        principal: &Principal,
        choice: AddressChoice,
    ) -> Result<Option<DeliveryAddress>> {
        match choice {
            AddressChoice::Inline(address) => Ok(Some(address)),
            AddressChoice::Saved(id) => self
                .store
                .get_address(&principal.cid, id)
                .await?
                .map(|a| Some(DeliveryAddress::from(a)))
                .ok_or(CheckoutError::AddressNotFound(id)),
            AddressChoice::Default => Ok(self
                .store
                .default_address(&principal.cid)
                .await?
                .map(DeliveryAddress::from)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_orders(
        &self,
        principal: &Principal,
        buyer: &BuyerSnapshot,
        products: &HashMap<ProductId, ProductRecord>,
        lines: &[(ProductId, Quantity)],
        source: OrderSource,
        delivery_address: Option<DeliveryAddress>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Order>, Vec<OrderDocument>)> {
        let mut orders = Vec::with_capacity(lines.len());
        let mut docs = Vec::with_capacity(lines.len());

        for (product_id, quantity) in lines {
            let product = products
                .get(product_id)
                .ok_or(CheckoutError::ProductNotFound(*product_id))?;

            // The id exists before the code so the code can name the order.
            let id = common::OrderId::new();
            let checkpoint = self.checkpoints.generate(&CheckpointPayload::new(
                id,
                source,
                buyer.cid.clone(),
                product.id,
                &product.name,
                quantity.get(),
                now,
            ))?;

            let order = Order::place(NewOrder {
                id,
                buyer: buyer.clone(),
                product: ProductSnapshot::from(product),
                quantity: *quantity,
                checkpoint,
                source,
                delivery_address: delivery_address.clone(),
                placed_by: principal.changed_by(),
                placed_at: now,
            })?;

            docs.push(order.to_document(Version::initial())?);
            orders.push(order);
        }

        Ok((orders, docs))
    }
}

/// Releases whatever the saga holds and reports how that went.
async fn unwind<S: MarketStore>(saga: ReservationSaga<'_, S>) {
    let held = saga.reservations().len();
    if held == 0 {
        return;
    }

    let outcome = saga.compensate().await;
    metrics::counter!("checkout_compensations_total", "outcome" => outcome.as_str()).increment(1);
    match outcome {
        Compensation::Released => {
            tracing::warn!(released = held, "Reservations compensated");
        }
        Compensation::Stranded { units } => {
            tracing::error!(
                reservations = held,
                units,
                "Reserved stock could not be fully returned"
            );
        }
    }
}

fn record(source: OrderSource, started: Instant, result: &Result<CheckoutReceipt>) {
    metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
    match result {
        Ok(receipt) => {
            metrics::counter!("orders_placed_total", "source" => source.as_str())
                .increment(receipt.orders.len() as u64);
            tracing::info!(
                %source,
                orders = receipt.orders.len(),
                "Checkout completed"
            );
        }
        Err(e) => {
            metrics::counter!("checkout_rejected_total", "reason" => e.reason()).increment(1);
            tracing::info!(%source, error = %e, "Checkout rejected");
        }
    }
}
