//! Shared identifiers and value types for the marketplace order engine.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{Cid, InvalidCid, OrderId, ProductId};
