//! Role authorization for order access and transitions.
//!
//! The actor is checked before the order's status, so a caller who may not
//! act on an order learns nothing about where it is in its lifecycle.

use crate::identity::Principal;
use crate::order::{Order, OrderError, OrderStatus, Transition};

/// Checks that `principal` is the party allowed to perform `transition`.
///
/// | Transition | Actor |
/// |---|---|
/// | confirm, ship | product seller |
/// | cancel | buyer |
/// | accept for transport | any transporter |
/// | pick up | assigned transporter |
/// | deliver | assigned transporter, or the seller when none is assigned |
pub fn authorize(
    principal: &Principal,
    order: &Order,
    transition: Transition,
) -> Result<(), OrderError> {
    let permitted = match transition {
        Transition::Confirm | Transition::Ship => is_seller(principal, order),
        Transition::Cancel => principal.cid == order.buyer().cid,
        Transition::AcceptForTransport => principal.role.is_transporter(),
        Transition::PickUp => is_assigned_transporter(principal, order),
        Transition::Deliver => match order.transporter() {
            Some(_) => is_assigned_transporter(principal, order),
            None => is_seller(principal, order),
        },
    };

    if permitted {
        Ok(())
    } else {
        Err(OrderError::Forbidden {
            action: transition.action(),
        })
    }
}

/// Returns true if `principal` may see the order.
///
/// Participants are the buyer, the seller and the assigned transporter. Any
/// transporter may also see a shipped order nobody has accepted yet.
pub fn can_view(principal: &Principal, order: &Order) -> bool {
    principal.cid == order.buyer().cid
        || is_seller(principal, order)
        || is_assigned_transporter(principal, order)
        || (principal.role.is_transporter()
            && order.status() == OrderStatus::Shipped
            && order.transporter().is_none())
}

fn is_seller(principal: &Principal, order: &Order) -> bool {
    &principal.cid == order.seller()
}

fn is_assigned_transporter(principal: &Principal, order: &Order) -> bool {
    order
        .transporter()
        .is_some_and(|t| t.cid == principal.cid && principal.role.is_transporter())
}
