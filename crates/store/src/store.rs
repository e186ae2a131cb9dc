use async_trait::async_trait;
use common::{Cid, OrderId, ProductId};
use uuid::Uuid;

use crate::{
    AddressRecord, CartLine, OrderDocument, OrderQuery, ProductRecord, Result, StockUpdate,
    UserRecord, Version,
};

/// Product storage with atomic stock operations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Retrieves a product by ID.
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>>;

    /// Retrieves several products. Unknown IDs are skipped.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<ProductRecord>>;

    /// Inserts or replaces a product.
    async fn put_product(&self, product: ProductRecord) -> Result<()>;

    /// Decrements stock by `quantity` if and only if at least that much remains.
    ///
    /// The check and the write are a single atomic step: concurrent callers
    /// can never jointly take more than the stock held before them.
    async fn decrement_stock(&self, id: ProductId, quantity: u32) -> Result<StockUpdate>;

    /// Adds `quantity` back to stock, returning the new stock level.
    async fn increment_stock(&self, id: ProductId, quantity: u32) -> Result<u32>;
}

/// Order storage with optimistic concurrency on updates.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts new orders atomically - either all are stored or none are.
    ///
    /// Each document is stored at [`Version::first`].
    async fn insert_orders(&self, orders: Vec<OrderDocument>) -> Result<()>;

    /// Retrieves an order by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderDocument>>;

    /// Replaces an order if its stored version equals `expected`.
    ///
    /// Fails with `ConcurrencyConflict` otherwise. Returns the new version.
    async fn update_order(&self, order: OrderDocument, expected: Version) -> Result<Version>;

    /// Lists orders matching a query, newest first.
    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<OrderDocument>>;
}

/// User profiles.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Retrieves a user by CID.
    async fn get_user(&self, cid: &Cid) -> Result<Option<UserRecord>>;

    /// Retrieves several users. Unknown CIDs are skipped.
    async fn get_users(&self, cids: &[Cid]) -> Result<Vec<UserRecord>>;

    /// Inserts or replaces a user.
    async fn put_user(&self, user: UserRecord) -> Result<()>;
}

/// Buyer carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the lines of a buyer's cart, empty if there is none.
    async fn get_cart(&self, owner: &Cid) -> Result<Vec<CartLine>>;

    /// Replaces a buyer's cart.
    async fn put_cart(&self, owner: &Cid, lines: Vec<CartLine>) -> Result<()>;

    /// Removes every line from a buyer's cart.
    async fn clear_cart(&self, owner: &Cid) -> Result<()>;
}

/// Delivery addresses.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Retrieves one of a user's addresses.
    async fn get_address(&self, owner: &Cid, id: Uuid) -> Result<Option<AddressRecord>>;

    /// Retrieves a user's default address.
    async fn default_address(&self, owner: &Cid) -> Result<Option<AddressRecord>>;

    /// Inserts or replaces an address.
    ///
    /// Storing a default address clears the flag on the owner's other addresses.
    async fn put_address(&self, address: AddressRecord) -> Result<()>;
}

/// Every store the order engine consumes, behind one cloneable handle.
pub trait MarketStore:
    ProductStore + OrderStore + IdentityStore + CartStore + AddressBook + Clone + 'static
{
}

impl<T> MarketStore for T where
    T: ProductStore + OrderStore + IdentityStore + CartStore + AddressBook + Clone + 'static
{
}
