//! Order lifecycle and inventory rules for the produce marketplace.
//!
//! This crate provides:
//! - Typed roles and request principals resolved from the identity store
//! - The order record with its buyer, product and delivery snapshots
//! - The fulfillment state machine and the role authorization guard
//! - The inventory ledger (atomic reserve, best-effort release)
//! - Checkpoint code generation and decoding

pub mod checkpoint;
pub mod error;
pub mod fulfillment;
pub mod guard;
pub mod identity;
pub mod ledger;
pub mod order;

pub use checkpoint::{
    CheckpointCode, CheckpointError, CheckpointGenerator, CheckpointPayload, CheckpointRenderer,
    QrSvgRenderer,
};
pub use error::DomainError;
pub use fulfillment::{Contact, FulfillmentService, PurchaseView, TransportCandidate};
pub use guard::authorize;
pub use identity::{IdentityError, IdentityResolver, Principal, Role, UnknownRole};
pub use ledger::{InventoryLedger, LedgerError, Reservation};
pub use order::{
    BuyerSnapshot, ChangedBy, DeliveryAddress, NewOrder, Order, OrderError, OrderSource,
    OrderStatus, ProductSnapshot, Quantity, StatusChange, Transition, TransitionDetails,
    TransporterSnapshot,
};
