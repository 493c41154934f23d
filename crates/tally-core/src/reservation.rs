//! # Reservation Coordinator
//!
//! Holds, confirms and releases stock for all line items of an order as
//! one unit.
//!
//! ## Reservation Lifecycle
//! ```text
//!                    hold_all()
//!                        │
//!           any item short? ──yes──► release earlier holds (reverse order)
//!                        │               └──► InsufficientStock
//!                        no
//!                        ▼
//!                  ┌───────────┐
//!                  │   HELD    │──── dropped while HELD ────┐
//!                  └─────┬─────┘                            │
//!            confirm()   │   release()                      │
//!          ┌─────────────┴─────────────┐                    ▼
//!          ▼                           ▼              units released
//!   ┌─────────────┐             ┌─────────────┐       synchronously
//!   │  CONFIRMED  │             │  RELEASED   │
//!   └─────────────┘             └─────────────┘
//!   release() refused           release() no-op
//! ```
//!
//! Items are always reserved in ascending product-id order. Since every
//! checkout acquires product locks in the same order and holds at most one
//! at a time, concurrent `hold_all` calls cannot deadlock.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::InventoryLedger;
use crate::types::ReservationState;
use crate::validation::ensure_positive;
use crate::ALERT_TARGET;

// =============================================================================
// Reservation
// =============================================================================

/// One held line of a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedItem {
    pub product_id: String,
    pub quantity: i64,
    /// Set once the ledger has consumed this item.
    pub confirmed: bool,
}

/// Stock held for a single order.
///
/// Owned by exactly one checkout call and never cloned. Dropping a
/// reservation that is still `Held` returns its unconfirmed units to
/// available stock.
#[derive(Debug)]
pub struct Reservation {
    order_id: String,
    items: Vec<ReservedItem>,
    state: ReservationState,
    ledger: Arc<InventoryLedger>,
}

impl Reservation {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    /// Held items in ascending product-id order.
    pub fn items(&self) -> &[ReservedItem] {
        &self.items
    }

    pub fn state(&self) -> ReservationState {
        self.state
    }

    pub fn is_held(&self) -> bool {
        self.state == ReservationState::Held
    }

    fn reason(&self) -> String {
        format!("order {}", self.order_id)
    }

    /// Releases every unconfirmed item exactly once and marks the
    /// reservation released, even if one of the ledger calls fails.
    fn release_unconfirmed(&mut self) -> CoreResult<()> {
        let reason = self.reason();
        let mut first_error = None;

        for item in self.items.iter().rev().filter(|item| !item.confirmed) {
            if let Err(e) = self.ledger.release(&item.product_id, item.quantity, &reason) {
                error!(
                    target: ALERT_TARGET,
                    order_id = %self.order_id,
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    error = %e,
                    "Failed to release reserved stock"
                );
                first_error.get_or_insert(e);
            }
        }

        self.state = ReservationState::Released;
        match first_error {
            Some(e) => Err(CoreError::invalid_state(
                &self.order_id,
                format!("release failed: {e}"),
            )),
            None => Ok(()),
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.state != ReservationState::Held {
            return;
        }

        warn!(
            order_id = %self.order_id,
            items = self.items.len(),
            "Held reservation dropped, releasing stock"
        );
        // Failures are already reported on the alert target.
        let _ = self.release_unconfirmed();
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Coordinates all-or-nothing holds against a shared ledger.
#[derive(Debug, Clone)]
pub struct ReservationCoordinator {
    ledger: Arc<InventoryLedger>,
}

impl ReservationCoordinator {
    pub fn new(ledger: Arc<InventoryLedger>) -> Self {
        ReservationCoordinator { ledger }
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger> {
        &self.ledger
    }

    /// Reserves every `(product_id, quantity)` pair or none of them.
    ///
    /// Duplicate product ids are merged. On the first failure every item
    /// already held is released in reverse order before the error is
    /// returned.
    ///
    /// ## Errors
    /// - `InsufficientStock` / `ProductNotFound` from the failing item
    /// - `Validation` for an empty item list, a non-positive quantity, or
    ///   merged quantities that overflow
    pub fn hold_all(&self, order_id: &str, items: &[(String, i64)]) -> CoreResult<Reservation> {
        if items.is_empty() {
            return Err(ValidationError::Required {
                field: "reservation items".to_string(),
            }
            .into());
        }

        let mut merged: BTreeMap<&str, i64> = BTreeMap::new();
        for (product_id, quantity) in items {
            ensure_positive(*quantity, "quantity")?;
            let total = merged.entry(product_id.as_str()).or_insert(0);
            *total = total
                .checked_add(*quantity)
                .ok_or_else(|| ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 1,
                    max: i64::MAX,
                })?;
        }

        let mut reservation = Reservation {
            order_id: order_id.to_string(),
            items: Vec::with_capacity(merged.len()),
            state: ReservationState::Held,
            ledger: self.ledger.clone(),
        };
        let reason = reservation.reason();

        for (product_id, quantity) in merged {
            match self.ledger.reserve(product_id, quantity, &reason) {
                Ok(_) => reservation.items.push(ReservedItem {
                    product_id: product_id.to_string(),
                    quantity,
                    confirmed: false,
                }),
                Err(e) => {
                    debug!(
                        order_id = %order_id,
                        product_id = %product_id,
                        held = reservation.items.len(),
                        error = %e,
                        "Hold failed, rolling back"
                    );
                    // Rollback failures are alerted inside release_unconfirmed.
                    let _ = reservation.release_unconfirmed();
                    return Err(e);
                }
            }
        }

        debug!(order_id = %order_id, items = reservation.items.len(), "Reservation held");
        Ok(reservation)
    }

    /// Consumes every held item (reserved → sold).
    ///
    /// A failure here means the ledger and the reservation disagree. It is
    /// alerted and surfaced as `InvalidReservationState`. Items confirmed
    /// before the failure stay confirmed; the rest remain held so that a
    /// following [`release`](Self::release) frees only those.
    pub fn confirm(&self, reservation: &mut Reservation) -> CoreResult<()> {
        if reservation.state != ReservationState::Held {
            return Err(CoreError::invalid_state(
                &reservation.order_id,
                format!("cannot confirm a {:?} reservation", reservation.state),
            ));
        }

        let reason = reservation.reason();
        for item in reservation.items.iter_mut().filter(|item| !item.confirmed) {
            if let Err(e) = self.ledger.confirm(&item.product_id, item.quantity, &reason) {
                error!(
                    target: ALERT_TARGET,
                    order_id = %reservation.order_id,
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    error = %e,
                    "Failed to confirm reserved stock"
                );
                return Err(CoreError::invalid_state(
                    &reservation.order_id,
                    format!("confirm failed for {}: {e}", item.product_id),
                ));
            }
            item.confirmed = true;
        }

        reservation.state = ReservationState::Confirmed;
        debug!(order_id = %reservation.order_id, "Reservation confirmed");
        Ok(())
    }

    /// Returns held units to available stock.
    ///
    /// No-op on an already released reservation. Refused without moving
    /// stock on a confirmed one.
    pub fn release(&self, reservation: &mut Reservation) -> CoreResult<()> {
        match reservation.state {
            ReservationState::Released => Ok(()),
            ReservationState::Confirmed => Err(CoreError::invalid_state(
                &reservation.order_id,
                "confirmed reservation cannot be released",
            )),
            ReservationState::Held => {
                let result = reservation.release_unconfirmed();
                debug!(order_id = %reservation.order_id, "Reservation released");
                result
            }
        }
    }

    /// Returns confirmed units of a cancelled paid order to available stock.
    ///
    /// Every item is attempted; the first failure is returned.
    pub fn restock(&self, order_id: &str, items: &[(String, i64)], reason: &str) -> CoreResult<()> {
        let reason = format!("order {order_id}: {reason}");
        let mut first_error = None;

        for (product_id, quantity) in items {
            if let Err(e) = self.ledger.restock(product_id, *quantity, &reason) {
                error!(
                    target: ALERT_TARGET,
                    order_id = %order_id,
                    product_id = %product_id,
                    quantity,
                    error = %e,
                    "Failed to restock cancelled order"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
