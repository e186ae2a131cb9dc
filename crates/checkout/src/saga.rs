//! Reservation saga: ordered reserve steps with paired compensations.

use std::fmt;

use common::ProductId;
use domain::{InventoryLedger, LedgerError, Reservation};
use store::ProductStore;

/// How a compensation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// Every reservation was put back.
    Released,
    /// Some units could not be put back and stay off the shelf.
    Stranded { units: u32 },
}

impl Compensation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compensation::Released => "released",
            Compensation::Stranded { .. } => "stranded",
        }
    }
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Takes stock one line at a time and can give all of it back.
///
/// Reservations are sequential rather than one multi-product transaction;
/// a failure part-way is undone by releasing what was taken, newest first.
pub struct ReservationSaga<'a, S: ProductStore> {
    ledger: &'a InventoryLedger<S>,
    reservations: Vec<Reservation>,
}

impl<'a, S: ProductStore> ReservationSaga<'a, S> {
    pub fn new(ledger: &'a InventoryLedger<S>) -> Self {
        Self {
            ledger,
            reservations: Vec::new(),
        }
    }

    /// Reservations taken so far, in order.
    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    /// Reserves one line.
    ///
    /// A failed step takes nothing; earlier steps stay held until the saga
    /// is completed or compensated.
    pub async fn reserve(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation, LedgerError> {
        let reservation = self.ledger.reserve(product_id, quantity).await?;
        self.reservations.push(reservation);
        Ok(reservation)
    }

    /// Keeps every reservation.
    pub fn complete(self) -> Vec<Reservation> {
        self.reservations
    }

    /// Releases every reservation in reverse order.
    ///
    /// Returns [`Compensation::Stranded`] with the units the ledger could not
    /// put back, otherwise [`Compensation::Released`].
    pub async fn compensate(mut self) -> Compensation {
        let mut stranded = 0;
        while let Some(reservation) = self.reservations.pop() {
            if !self
                .ledger
                .release(reservation.product_id, reservation.quantity)
                .await
            {
                stranded += reservation.quantity;
            }
        }
        if stranded == 0 {
            Compensation::Released
        } else {
            Compensation::Stranded { units: stranded }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Cid, Money};
    use store::{InMemoryMarketStore, ProductRecord};

    async fn product(store: &InMemoryMarketStore, stock: u32) -> ProductId {
        let id = ProductId::new();
        store
            .put_product(ProductRecord {
                id,
                name: "Ginger".to_string(),
                price: Money::from_cents(9_000),
                unit: "kg".to_string(),
                stock_quantity: stock,
                seller: Cid::parse("22222222222").unwrap(),
                image: String::new(),
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_complete_keeps_reservations() {
        let store = InMemoryMarketStore::new();
        let a = product(&store, 5).await;
        let b = product(&store, 5).await;
        let ledger = InventoryLedger::new(store.clone());

        let mut saga = ReservationSaga::new(&ledger);
        saga.reserve(a, 2).await.unwrap();
        saga.reserve(b, 4).await.unwrap();

        let kept = saga.complete();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].remaining, 1);
        assert_eq!(store.stock_of(a).await, Some(3));
        assert_eq!(store.stock_of(b).await, Some(1));
    }

    #[tokio::test]
    async fn test_failed_step_then_compensate_restores_everything() {
        let store = InMemoryMarketStore::new();
        let a = product(&store, 5).await;
        let b = product(&store, 1).await;
        let ledger = InventoryLedger::new(store.clone());

        let mut saga = ReservationSaga::new(&ledger);
        saga.reserve(a, 3).await.unwrap();
        let err = saga.reserve(b, 2).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 1, .. }));
        assert_eq!(saga.reservations().len(), 1);

        assert_eq!(saga.compensate().await, Compensation::Released);
        assert_eq!(store.stock_of(a).await, Some(5));
        assert_eq!(store.stock_of(b).await, Some(1));
    }

    #[tokio::test]
    async fn test_unreleased_units_are_reported() {
        let store = InMemoryMarketStore::new();
        let a = product(&store, 5).await;
        let b = product(&store, 5).await;
        let ledger = InventoryLedger::new(store.clone());

        let mut saga = ReservationSaga::new(&ledger);
        saga.reserve(a, 2).await.unwrap();
        saga.reserve(b, 3).await.unwrap();

        store.set_fail_stock_increments(true).await;
        let state = saga.compensate().await;
        assert_eq!(state, Compensation::Stranded { units: 5 });
        assert_eq!(state.to_string(), "stranded");
    }
}
