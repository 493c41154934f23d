//! # Settlement Orchestrator
//!
//! Drives a checkout from request to PAID or CANCELLED and owns every
//! later status change.
//!
//! ## Checkout
//! ```text
//! create_order(request)
//!     │
//!     ├── validate ─────────────────────────► Validation (no side effect)
//!     ├── price every line from the catalog ► ProductNotFound
//!     ├── hold_all ─────────────────────────► InsufficientStock (nothing held)
//!     ├── save PENDING ─────────────────────► Store (reservation released)
//!     ├── charge (bounded by payment timeout)
//!     │       │
//!     │       ├── approved ──► confirm ──► save PAID ──► Ok(order)
//!     │       │
//!     │       └── declined / timed out
//!     │               └──► release ──► save CANCELLED ──► PaymentFailed
//!     │
//!     └── future dropped mid-flight ──► Reservation::drop releases held stock
//! ```
//!
//! ## Status Machine
//! ```text
//!   PENDING ──► PAID ──► SHIPPED ──► DELIVERED
//!      │          │
//!      └──────────┴──► CANCELLED
//! ```
//!
//! PAID is written only by checkout. Cancelling a PAID order saves
//! CANCELLED first and only then restocks its confirmed units. An order
//! with a checkout or status change in flight is claimed; a second status
//! change on it is refused until the first finishes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tally_core::validation::{validate_order_request, OrderLimits, ValidatedOrder};
use tally_core::{
    ChargeOutcome, InventoryLedger, InventorySummary, LineItem, Money, Order, OrderRequest,
    OrderStatus, OrderStore, PaymentGateway, ProductCatalog, ProductStock, Reservation,
    ReservationCoordinator, StoreError, ValidationError, ALERT_TARGET, PAYMENT_FAILED_REASON,
};

use crate::config::SettlementConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::events::{SettlementEvent, SettlementObserver};

const PAYMENT_TIMED_OUT: &str = "payment timed out";
const PAYMENT_DECLINED: &str = "payment declined";

// =============================================================================
// Order Claims
// =============================================================================

type ClaimSet = Arc<Mutex<HashSet<String>>>;

/// Marks an order as being worked on. Released on drop.
struct OrderClaim {
    claims: ClaimSet,
    order_id: String,
}

impl OrderClaim {
    fn try_acquire(claims: &ClaimSet, order_id: &str) -> Option<Self> {
        let inserted = claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order_id.to_string());

        inserted.then(|| OrderClaim {
            claims: claims.clone(),
            order_id: order_id.to_string(),
        })
    }
}

impl Drop for OrderClaim {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.order_id);
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Clone)]
pub struct SettlementOrchestrator {
    coordinator: ReservationCoordinator,
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn ProductCatalog>,
    observers: Vec<Arc<dyn SettlementObserver>>,
    limits: OrderLimits,
    payment_timeout: Duration,
    claims: ClaimSet,
}

impl SettlementOrchestrator {
    pub fn new(
        ledger: Arc<InventoryLedger>,
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn ProductCatalog>,
        config: &SettlementConfig,
    ) -> Self {
        SettlementOrchestrator {
            coordinator: ReservationCoordinator::new(ledger),
            store,
            gateway,
            catalog,
            observers: Vec::new(),
            limits: config.order_limits(),
            payment_timeout: config.payment_timeout(),
            claims: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SettlementObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger> {
        self.coordinator.ledger()
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Places, reserves and pays for an order.
    ///
    /// Returns the PAID order. Every failure after the hold has already
    /// released the reservation when the error is returned, except a
    /// confirm failure, which is alerted as `InvalidReservationState`.
    ///
    /// ## Errors
    /// - `Validation` / `ProductNotFound` / `InsufficientStock`: nothing
    ///   was reserved or written
    /// - `PaymentFailed`: the order exists and is CANCELLED
    /// - `InvalidReservationState`: ledger and reservation disagree
    /// - `Store`: a collaborator failed
    pub async fn create_order(&self, request: OrderRequest) -> SettlementResult<Order> {
        let validated = validate_order_request(&request, &self.limits)?;
        let (items, total) = self.price_lines(&request, &validated).await?;

        let order_id = Uuid::new_v4().to_string();
        let _claim = OrderClaim::try_acquire(&self.claims, &order_id).ok_or_else(|| {
            SettlementError::invalid_transition(
                &order_id,
                OrderStatus::Pending,
                OrderStatus::Pending,
                "operation in progress",
            )
        })?;

        let mut reservation = self.coordinator.hold_all(&order_id, &validated.lines)?;

        let now = Utc::now();
        let mut order = Order {
            id: order_id.clone(),
            user_id: validated.user_id,
            items,
            total_cents: total.cents(),
            status: OrderStatus::Pending,
            shipping_address: validated.shipping_address,
            billing_address: validated.billing_address,
            payment_method: validated.payment_method,
            settlement_id: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        };

        if let Err(e) = self.store.save(&order).await {
            warn!(order_id = %order_id, error = %e, "Failed to persist pending order, releasing stock");
            self.release_quietly(&mut reservation);
            return Err(e.into());
        }

        self.emit(SettlementEvent::OrderPlaced {
            order_id: order_id.clone(),
            user_id: order.user_id.clone(),
            total,
        });
        debug!(order_id = %order_id, total = %total, "Charging order");

        let outcome = match timeout(
            self.payment_timeout,
            self.gateway.charge(total, order.payment_method, &order_id),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    order_id = %order_id,
                    timeout_ms = self.payment_timeout.as_millis() as u64,
                    "Payment call timed out"
                );
                ChargeOutcome::declined(PAYMENT_TIMED_OUT)
            }
        };

        if outcome.success {
            self.settle(order, reservation, outcome).await
        } else {
            let reason = outcome
                .error_message
                .unwrap_or_else(|| PAYMENT_DECLINED.to_string());
            self.compensate(&mut order, &mut reservation, &reason).await;
            Err(SettlementError::PaymentFailed { order_id, reason })
        }
    }

    /// Resolves catalog name and price for every merged line and sums the
    /// order total. Client-supplied prices are ignored.
    async fn price_lines(
        &self,
        request: &OrderRequest,
        validated: &ValidatedOrder,
    ) -> SettlementResult<(Vec<LineItem>, Money)> {
        let mut items = Vec::with_capacity(validated.lines.len());
        let mut total = Money::zero();

        for (product_id, quantity) in &validated.lines {
            let price = self
                .catalog
                .get_price(product_id)
                .await
                .map_err(|e| catalog_error(product_id, e))?;
            let name = self
                .catalog
                .get_name(product_id)
                .await
                .map_err(|e| catalog_error(product_id, e))?;

            if price.is_negative() {
                return Err(SettlementError::Store(format!(
                    "catalog price for {product_id} is negative"
                )));
            }

            let client_prices = request
                .items
                .iter()
                .filter(|line| line.product_id.trim() == product_id)
                .filter_map(|line| line.unit_price_cents);
            for client_price in client_prices {
                if client_price != price.cents() {
                    debug!(
                        product_id = %product_id,
                        client_price,
                        catalog_price = price.cents(),
                        "Ignoring client-supplied price"
                    );
                }
            }

            total = price
                .checked_mul_quantity(*quantity)
                .and_then(|line_total| total.checked_add(line_total))
                .ok_or_else(|| ValidationError::OutOfRange {
                    field: "order total".to_string(),
                    min: 0,
                    max: i64::MAX,
                })?;

            items.push(LineItem {
                product_id: product_id.clone(),
                product_name: name,
                quantity: *quantity,
                unit_price_cents: price.cents(),
            });
        }

        Ok((items, total))
    }

    async fn settle(
        &self,
        mut order: Order,
        mut reservation: Reservation,
        outcome: ChargeOutcome,
    ) -> SettlementResult<Order> {
        if let Err(e) = self.coordinator.confirm(&mut reservation) {
            self.emit(SettlementEvent::ReservationFault {
                order_id: order.id.clone(),
                detail: e.to_string(),
            });
            // Whatever was not consumed goes back to available.
            self.release_quietly(&mut reservation);
            return Err(e.into());
        }

        order.settlement_id = outcome.settlement_id;
        order.apply_status(OrderStatus::Paid, None, Utc::now());

        let saved = match self.store.save(&order).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(
                    target: ALERT_TARGET,
                    order_id = %order.id,
                    settlement_id = order.settlement_id.as_deref().unwrap_or(""),
                    error = %e,
                    "Paid order could not be persisted"
                );
                return Err(e.into());
            }
        };

        info!(order_id = %saved.id, total = %saved.total(), "Order settled");
        self.emit(SettlementEvent::OrderPaid {
            order_id: saved.id.clone(),
            settlement_id: saved.settlement_id.clone().unwrap_or_default(),
        });
        self.report_low_stock(&saved.items);

        Ok(saved)
    }

    async fn compensate(&self, order: &mut Order, reservation: &mut Reservation, reason: &str) {
        warn!(order_id = %order.id, reason = %reason, "Payment failed, releasing reservation");

        if let Err(e) = self.coordinator.release(reservation) {
            self.emit(SettlementEvent::ReservationFault {
                order_id: order.id.clone(),
                detail: e.to_string(),
            });
        }

        order.apply_status(OrderStatus::Cancelled, Some(PAYMENT_FAILED_REASON), Utc::now());
        if let Err(e) = self.store.save(order).await {
            warn!(order_id = %order.id, error = %e, "Failed to persist cancelled order");
        }

        self.emit(SettlementEvent::OrderCancelled {
            order_id: order.id.clone(),
            from: OrderStatus::Pending,
            reason: Some(PAYMENT_FAILED_REASON.to_string()),
        });
    }

    fn release_quietly(&self, reservation: &mut Reservation) {
        if let Err(e) = self.coordinator.release(reservation) {
            self.emit(SettlementEvent::ReservationFault {
                order_id: reservation.order_id().to_string(),
                detail: e.to_string(),
            });
        }
    }

    fn report_low_stock(&self, items: &[LineItem]) {
        for item in items {
            match self.ledger().snapshot(&item.product_id) {
                Ok(stock) if stock.needs_reorder() => self.emit(SettlementEvent::LowStock {
                    product_id: stock.product_id,
                    available: stock.available,
                    reorder_threshold: stock.reorder_threshold,
                }),
                Ok(_) => {}
                Err(e) => debug!(product_id = %item.product_id, error = %e, "No stock record"),
            }
        }
    }

    // =========================================================================
    // Status Changes
    // =========================================================================

    /// Moves an order along the status machine.
    ///
    /// `reason` is recorded when cancelling.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown order
    /// - `InvalidTransition` for an edge the machine does not allow, for
    ///   PAID, and for an order with another operation in flight
    /// - `Store` when the new status cannot be written; no stock moves
    /// - `InvalidReservationState` when restocking a cancelled PAID order
    ///   fails after CANCELLED was saved; the units stay out of stock and
    ///   an alert is raised
    ///
    /// A PAID order is saved as CANCELLED before its units go back, so a
    /// failed write can be retried without crediting stock twice.
    pub async fn update_order_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        reason: Option<&str>,
    ) -> SettlementResult<Order> {
        let Some(_claim) = OrderClaim::try_acquire(&self.claims, order_id) else {
            let current = self.load(order_id).await?;
            return Err(SettlementError::invalid_transition(
                order_id,
                current.status,
                new_status,
                "operation in progress",
            ));
        };

        let mut order = self.load(order_id).await?;
        let from = order.status;

        if new_status == OrderStatus::Paid {
            return Err(SettlementError::invalid_transition(
                order_id,
                from,
                new_status,
                "orders are paid only through checkout",
            ));
        }

        if !from.can_transition_to(new_status) {
            return Err(SettlementError::invalid_transition(
                order_id,
                from,
                new_status,
                "not a permitted transition",
            ));
        }

        let restock_lines = if new_status == OrderStatus::Cancelled && from == OrderStatus::Paid {
            Some(self.store.find_line_items(order_id).await?)
        } else {
            None
        };

        order.apply_status(new_status, reason, Utc::now());
        let saved = self.store.save(&order).await?;

        if let Some(items) = restock_lines {
            self.restock_cancelled(order_id, &items, reason)?;
        }

        self.emit(SettlementEvent::StatusChanged {
            order_id: order_id.to_string(),
            from,
            to: new_status,
        });
        if new_status == OrderStatus::Cancelled {
            self.emit(SettlementEvent::OrderCancelled {
                order_id: order_id.to_string(),
                from,
                reason: reason.map(str::to_string),
            });
        }

        Ok(saved)
    }

    fn restock_cancelled(
        &self,
        order_id: &str,
        items: &[LineItem],
        reason: Option<&str>,
    ) -> SettlementResult<()> {
        let lines: Vec<(String, i64)> = items
            .iter()
            .map(|item| (item.product_id.clone(), item.quantity))
            .collect();

        if let Err(e) = self
            .coordinator
            .restock(order_id, &lines, reason.unwrap_or("cancelled"))
        {
            error!(
                target: ALERT_TARGET,
                order_id = %order_id,
                error = %e,
                "Cancelled order could not be restocked"
            );
            self.emit(SettlementEvent::ReservationFault {
                order_id: order_id.to_string(),
                detail: e.to_string(),
            });
            return Err(SettlementError::InvalidReservationState {
                subject: order_id.to_string(),
                reason: format!("restock failed: {e}"),
            });
        }

        debug!(order_id = %order_id, lines = lines.len(), "Cancelled order restocked");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_order(&self, order_id: &str) -> SettlementResult<Order> {
        self.load(order_id).await
    }

    pub async fn line_items(&self, order_id: &str) -> SettlementResult<Vec<LineItem>> {
        Ok(self.store.find_line_items(order_id).await?)
    }

    pub fn inventory_summary(&self) -> InventorySummary {
        self.ledger().summary()
    }

    pub fn low_stock(&self) -> Vec<ProductStock> {
        self.ledger().low_stock()
    }

    async fn load(&self, order_id: &str) -> SettlementResult<Order> {
        self.store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound {
                entity: "order",
                id: order_id.to_string(),
            })
    }

    fn emit(&self, event: SettlementEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

fn catalog_error(product_id: &str, err: StoreError) -> SettlementError {
    if err.is_not_found() {
        SettlementError::ProductNotFound(product_id.to_string())
    } else {
        err.into()
    }
}
