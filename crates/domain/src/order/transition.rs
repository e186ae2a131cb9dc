//! Fulfillment transitions.

use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// A requested change of order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
    /// Seller accepts a placed order.
    Confirm,
    /// Seller hands the produce off.
    Ship,
    /// Transporter takes a shipped order and assigns itself.
    AcceptForTransport,
    /// Assigned transporter collects the produce.
    PickUp,
    /// Produce reaches the buyer.
    Deliver,
    /// Buyer withdraws a placed order.
    Cancel,
}

impl Transition {
    /// Short verb used in error messages.
    pub fn action(&self) -> &'static str {
        match self {
            Transition::Confirm => "confirm",
            Transition::Ship => "ship",
            Transition::AcceptForTransport => "accept for transport",
            Transition::PickUp => "pick up",
            Transition::Deliver => "deliver",
            Transition::Cancel => "cancel",
        }
    }

    /// Stable name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Confirm => "confirm",
            Transition::Ship => "ship",
            Transition::AcceptForTransport => "accept-for-transport",
            Transition::PickUp => "pick-up",
            Transition::Deliver => "deliver",
            Transition::Cancel => "cancel",
        }
    }

    /// The status an order ends up in after this transition.
    pub fn target(&self) -> OrderStatus {
        match self {
            Transition::Confirm => OrderStatus::Confirmed,
            Transition::Ship => OrderStatus::Shipped,
            Transition::AcceptForTransport => OrderStatus::OutForDelivery,
            Transition::PickUp => OrderStatus::PickedUp,
            Transition::Deliver => OrderStatus::Delivered,
            Transition::Cancel => OrderStatus::Cancelled,
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional request data accompanying a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionDetails {
    /// Free text kept in the status history, e.g. a cancellation reason.
    pub notes: Option<String>,

    /// Overrides the transporter's profile name on acceptance.
    pub transporter_name: Option<String>,

    /// Overrides the transporter's profile phone number on acceptance.
    pub transporter_phone: Option<String>,
}

impl TransitionDetails {
    pub fn with_notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Default::default()
        }
    }
}
