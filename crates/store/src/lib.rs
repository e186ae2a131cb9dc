//! Persistence for the marketplace order engine.
//!
//! Exposes one trait per collaborator store (products, orders, identities,
//! carts, addresses) and two implementations of all of them: an in-memory
//! store for tests and local runs, and a PostgreSQL store.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod records;
pub mod store;
pub mod version;

pub use error::{Result, StoreError};
pub use memory::InMemoryMarketStore;
pub use postgres::PostgresMarketStore;
pub use query::OrderQuery;
pub use records::{AddressRecord, CartLine, OrderDocument, ProductRecord, StockUpdate, UserRecord};
pub use store::{AddressBook, CartStore, IdentityStore, MarketStore, OrderStore, ProductStore};
pub use version::Version;
