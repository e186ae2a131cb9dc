//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its fulfillment lifecycle.
///
/// State transitions:
/// ```text
/// Placed ──► Confirmed ──► Shipped ──► OutForDelivery ──► PickedUp ──► Delivered
///   │                         │                                          ▲
///   ▼                         └──────────── (no transporter) ────────────┘
/// Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    /// Stock reserved, awaiting the seller.
    #[default]
    Placed,

    /// Seller accepted the order.
    Confirmed,

    /// Seller handed the produce off for delivery.
    Shipped,

    /// A transporter accepted the order.
    OutForDelivery,

    /// The transporter collected the produce.
    PickedUp,

    /// Buyer received the produce (terminal state).
    Delivered,

    /// Buyer withdrew the order (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the seller can confirm in this status.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Placed)
    }

    /// Returns true if the seller can ship in this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Returns true if a transporter can accept the order in this status.
    pub fn can_accept_for_transport(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if the assigned transporter can pick up in this status.
    pub fn can_pick_up(&self) -> bool {
        matches!(self, OrderStatus::OutForDelivery)
    }

    /// Returns true if the seller can deliver without a transporter.
    pub fn can_deliver_directly(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if the assigned transporter can deliver in this status.
    pub fn can_deliver_by_transporter(&self) -> bool {
        matches!(self, OrderStatus::PickedUp)
    }

    /// Returns true if the buyer can cancel in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Placed)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns the status name as it appears on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::OutForDelivery => "out-for-delivery",
            OrderStatus::PickedUp => "picked-up",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 7] = [
        OrderStatus::Placed,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::PickedUp,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_default_status_is_placed() {
        assert_eq!(OrderStatus::default(), OrderStatus::Placed);
    }

    #[test]
    fn test_cancel_only_from_placed() {
        for status in ALL {
            assert_eq!(status.can_cancel(), status == OrderStatus::Placed);
        }
    }

    #[test]
    fn test_terminal_statuses_allow_nothing() {
        for status in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(!status.can_confirm());
            assert!(!status.can_ship());
            assert!(!status.can_accept_for_transport());
            assert!(!status.can_pick_up());
            assert!(!status.can_deliver_directly());
            assert!(!status.can_deliver_by_transporter());
            assert!(!status.can_cancel());
        }
        assert_eq!(ALL.iter().filter(|s| s.is_terminal()).count(), 2);
    }

    #[test]
    fn test_transporter_path() {
        assert!(OrderStatus::Shipped.can_accept_for_transport());
        assert!(OrderStatus::OutForDelivery.can_pick_up());
        assert!(OrderStatus::PickedUp.can_deliver_by_transporter());
        assert!(!OrderStatus::OutForDelivery.can_deliver_by_transporter());
        assert!(!OrderStatus::Placed.can_deliver_directly());
    }

    #[test]
    fn test_wire_names() {
        for status in ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert_eq!(OrderStatus::OutForDelivery.to_string(), "out-for-delivery");
    }
}
