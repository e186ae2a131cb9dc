use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Cid, OrderId, ProductId};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    AddressRecord, CartLine, OrderDocument, OrderQuery, ProductRecord, Result, StockUpdate,
    StoreError, UserRecord, Version,
    store::{AddressBook, CartStore, IdentityStore, OrderStore, ProductStore},
};

/// Failures the in-memory store can be told to produce.
#[derive(Debug, Default)]
struct Faults {
    fail_order_inserts: bool,
    fail_stock_increments: bool,
    fail_cart_clears: bool,
    /// Pause before an order insert takes the lock.
    order_insert_delay: Option<Duration>,
    /// Products whose stock is taken by a phantom buyer on the next decrement.
    sellouts: HashSet<ProductId>,
}

#[derive(Debug, Default)]
struct MarketState {
    products: HashMap<ProductId, ProductRecord>,
    /// Orders in insertion order.
    orders: Vec<OrderDocument>,
    users: HashMap<Cid, UserRecord>,
    carts: HashMap<Cid, Vec<CartLine>>,
    addresses: Vec<AddressRecord>,
    faults: Faults,
}

/// In-memory store implementation for tests and local runs.
///
/// A single lock guards all state, so every operation is atomic with
/// respect to every other one, matching the guarantees of the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemoryMarketStore {
    state: Arc<RwLock<MarketState>>,
}

impl InMemoryMarketStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the current stock of a product, if it exists.
    pub async fn stock_of(&self, id: ProductId) -> Option<u32> {
        self.state
            .read()
            .await
            .products
            .get(&id)
            .map(|p| p.stock_quantity)
    }

    /// Configures order inserts to fail.
    pub async fn set_fail_order_inserts(&self, fail: bool) {
        self.state.write().await.faults.fail_order_inserts = fail;
    }

    /// Makes every order insert wait before writing.
    pub async fn set_order_insert_delay(&self, delay: Option<Duration>) {
        self.state.write().await.faults.order_insert_delay = delay;
    }

    /// Configures stock increments to fail.
    pub async fn set_fail_stock_increments(&self, fail: bool) {
        self.state.write().await.faults.fail_stock_increments = fail;
    }

    /// Configures cart clears to fail.
    pub async fn set_fail_cart_clears(&self, fail: bool) {
        self.state.write().await.faults.fail_cart_clears = fail;
    }

    /// Makes the next decrement of `id` find the stock already bought out by
    /// another buyer.
    pub async fn simulate_concurrent_sellout(&self, id: ProductId) {
        self.state.write().await.faults.sellouts.insert(id);
    }
}

#[async_trait]
impl ProductStore for InMemoryMarketStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<ProductRecord>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn put_product(&self, product: ProductRecord) -> Result<()> {
        self.state
            .write()
            .await
            .products
            .insert(product.id, product);
        Ok(())
    }

    async fn decrement_stock(&self, id: ProductId, quantity: u32) -> Result<StockUpdate> {
        let mut state = self.state.write().await;
        let sold_out = state.faults.sellouts.remove(&id);

        let Some(product) = state.products.get_mut(&id) else {
            return Ok(StockUpdate::Missing);
        };

        if sold_out {
            product.stock_quantity = 0;
        }

        if product.stock_quantity < quantity {
            return Ok(StockUpdate::Insufficient {
                available: product.stock_quantity,
            });
        }

        product.stock_quantity -= quantity;
        Ok(StockUpdate::Applied {
            remaining: product.stock_quantity,
        })
    }

    async fn increment_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        let mut state = self.state.write().await;

        if state.faults.fail_stock_increments {
            return Err(StoreError::Unavailable("stock increments disabled".to_string()));
        }

        let product = state
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        product.stock_quantity = product.stock_quantity.saturating_add(quantity);
        Ok(product.stock_quantity)
    }
}

#[async_trait]
impl OrderStore for InMemoryMarketStore {
    async fn insert_orders(&self, orders: Vec<OrderDocument>) -> Result<()> {
        let delay = self.state.read().await.faults.order_insert_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;

        if state.faults.fail_order_inserts {
            return Err(StoreError::Unavailable("order inserts disabled".to_string()));
        }

        // Check every document before writing any, so a duplicate leaves
        // the store untouched.
        let mut seen = HashSet::new();
        for order in &orders {
            if !seen.insert(order.order_id)
                || state.orders.iter().any(|o| o.order_id == order.order_id)
            {
                return Err(StoreError::DuplicateOrder(order.order_id));
            }
        }

        state.orders.extend(orders.into_iter().map(|mut order| {
            order.version = Version::first();
            order
        }));
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderDocument>> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|o| o.order_id == id).cloned())
    }

    async fn update_order(&self, mut order: OrderDocument, expected: Version) -> Result<Version> {
        let mut state = self.state.write().await;
        let order_id = order.order_id;

        let stored = state
            .orders
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if stored.version != expected {
            return Err(StoreError::ConcurrencyConflict {
                order_id,
                expected,
                actual: stored.version,
            });
        }

        let new_version = expected.next();
        order.version = new_version;
        order.created_at = stored.created_at;
        *stored = order;
        Ok(new_version)
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<OrderDocument>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .iter()
            .rev()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();

        // Stable: equal timestamps keep newest-inserted first.
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = query.limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }
}

#[async_trait]
impl IdentityStore for InMemoryMarketStore {
    async fn get_user(&self, cid: &Cid) -> Result<Option<UserRecord>> {
        Ok(self.state.read().await.users.get(cid).cloned())
    }

    async fn get_users(&self, cids: &[Cid]) -> Result<Vec<UserRecord>> {
        let state = self.state.read().await;
        Ok(cids
            .iter()
            .filter_map(|cid| state.users.get(cid).cloned())
            .collect())
    }

    async fn put_user(&self, user: UserRecord) -> Result<()> {
        self.state
            .write()
            .await
            .users
            .insert(user.cid.clone(), user);
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryMarketStore {
    async fn get_cart(&self, owner: &Cid) -> Result<Vec<CartLine>> {
        Ok(self
            .state
            .read()
            .await
            .carts
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_cart(&self, owner: &Cid, lines: Vec<CartLine>) -> Result<()> {
        self.state.write().await.carts.insert(owner.clone(), lines);
        Ok(())
    }

    async fn clear_cart(&self, owner: &Cid) -> Result<()> {
        let mut state = self.state.write().await;
        if state.faults.fail_cart_clears {
            return Err(StoreError::Unavailable("cart clears disabled".to_string()));
        }
        state.carts.remove(owner);
        Ok(())
    }
}

#[async_trait]
impl AddressBook for InMemoryMarketStore {
    async fn get_address(&self, owner: &Cid, id: Uuid) -> Result<Option<AddressRecord>> {
        let state = self.state.read().await;
        Ok(state
            .addresses
            .iter()
            .find(|a| &a.owner == owner && a.id == id)
            .cloned())
    }

    async fn default_address(&self, owner: &Cid) -> Result<Option<AddressRecord>> {
        let state = self.state.read().await;
        Ok(state
            .addresses
            .iter()
            .find(|a| &a.owner == owner && a.is_default)
            .cloned())
    }

    async fn put_address(&self, address: AddressRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if address.is_default {
            for other in state.addresses.iter_mut().filter(|a| a.owner == address.owner) {
                other.is_default = false;
            }
        }
        state.addresses.retain(|a| a.id != address.id);
        state.addresses.push(address);
        Ok(())
    }
}
