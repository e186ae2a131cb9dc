//! Checkout orchestration for the produce marketplace.
//!
//! Three entry points share one procedure:
//! 1. Validate lines and pre-check live stock
//! 2. Reserve every line through a reservation saga
//! 3. Build orders with their checkpoint codes
//! 4. Persist all orders at once
//!
//! If anything after the first reservation fails, the saga releases every
//! reservation it made in reverse order before the error is returned. Each
//! attempt runs on its own task, so it settles even when the caller stops
//! waiting for it.

pub mod error;
pub mod orchestrator;
pub mod request;
pub mod saga;

pub use error::{CheckoutError, Result, StockShortfall};
pub use orchestrator::{CheckoutOrchestrator, CheckoutReceipt, RemainingStock};
pub use request::{AddressChoice, CheckoutLine};
pub use saga::{Compensation, ReservationSaga};
