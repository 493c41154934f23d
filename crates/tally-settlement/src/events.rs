//! # Settlement Events
//!
//! Observers invoked at each order state transition. Audit export,
//! notifications and metrics hang off this seam instead of living inside
//! the orchestrator.
//!
//! ```text
//!   create_order ──► OrderPlaced ──► OrderPaid ──► LowStock (per product)
//!                         │
//!                         └────────► OrderCancelled ("payment failed")
//!
//!   update_order_status ──► StatusChanged (+ OrderCancelled)
//!
//!   confirm / restock failure ──► ReservationFault
//! ```
//!
//! Observers run synchronously on the checkout task and must not block.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tally_core::{Money, OrderStatus};
use tracing::{error, info, warn};

use tally_core::ALERT_TARGET;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEvent {
    OrderPlaced {
        order_id: String,
        user_id: String,
        total: Money,
    },
    OrderPaid {
        order_id: String,
        settlement_id: String,
    },
    OrderCancelled {
        order_id: String,
        from: OrderStatus,
        reason: Option<String>,
    },
    StatusChanged {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },
    /// A paid order left a product at or below its reorder threshold.
    LowStock {
        product_id: String,
        available: i64,
        reorder_threshold: i64,
    },
    ReservationFault {
        order_id: String,
        detail: String,
    },
}

impl SettlementEvent {
    pub fn order_id(&self) -> Option<&str> {
        match self {
            SettlementEvent::OrderPlaced { order_id, .. }
            | SettlementEvent::OrderPaid { order_id, .. }
            | SettlementEvent::OrderCancelled { order_id, .. }
            | SettlementEvent::StatusChanged { order_id, .. }
            | SettlementEvent::ReservationFault { order_id, .. } => Some(order_id),
            SettlementEvent::LowStock { .. } => None,
        }
    }
}

/// Receives settlement events.
pub trait SettlementObserver: Send + Sync {
    fn on_event(&self, event: &SettlementEvent);
}

// =============================================================================
// Tracing Observer
// =============================================================================

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SettlementObserver for TracingObserver {
    fn on_event(&self, event: &SettlementEvent) {
        match event {
            SettlementEvent::OrderPlaced {
                order_id,
                user_id,
                total,
            } => info!(order_id = %order_id, user_id = %user_id, total = %total, "Order placed"),
            SettlementEvent::OrderPaid {
                order_id,
                settlement_id,
            } => info!(order_id = %order_id, settlement_id = %settlement_id, "Order paid"),
            SettlementEvent::OrderCancelled {
                order_id,
                from,
                reason,
            } => info!(
                order_id = %order_id,
                from = %from,
                reason = reason.as_deref().unwrap_or(""),
                "Order cancelled"
            ),
            SettlementEvent::StatusChanged { order_id, from, to } => {
                info!(order_id = %order_id, from = %from, to = %to, "Order status changed")
            }
            SettlementEvent::LowStock {
                product_id,
                available,
                reorder_threshold,
            } => warn!(
                product_id = %product_id,
                available,
                reorder_threshold,
                "Product needs reorder"
            ),
            SettlementEvent::ReservationFault { order_id, detail } => error!(
                target: ALERT_TARGET,
                order_id = %order_id,
                detail = %detail,
                "Reservation fault"
            ),
        }
    }
}

// =============================================================================
// Recording Observer
// =============================================================================

/// Keeps every event in memory. Used by tests and the checkout simulator.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SettlementEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SettlementEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_for(&self, order_id: &str) -> Vec<SettlementEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.order_id() == Some(order_id))
            .collect()
    }
}

impl SettlementObserver for RecordingObserver {
    fn on_event(&self, event: &SettlementEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_filters_by_order() {
        let recorder = RecordingObserver::new();
        recorder.on_event(&SettlementEvent::OrderPlaced {
            order_id: "o-1".into(),
            user_id: "u-1".into(),
            total: Money::from_cents(500),
        });
        recorder.on_event(&SettlementEvent::LowStock {
            product_id: "MUG-01".into(),
            available: 1,
            reorder_threshold: 2,
        });
        recorder.on_event(&SettlementEvent::OrderPaid {
            order_id: "o-2".into(),
            settlement_id: "cc_1".into(),
        });

        assert_eq!(recorder.events().len(), 3);
        assert_eq!(recorder.events_for("o-1").len(), 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = SettlementEvent::StatusChanged {
            order_id: "o-1".into(),
            from: OrderStatus::Paid,
            to: OrderStatus::Shipped,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["to"], "shipped");
    }
}
