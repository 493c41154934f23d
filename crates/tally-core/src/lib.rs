//! # tally-core: Pure Inventory & Settlement Logic
//!
//! This crate is the **heart** of Tally. It owns the stock counters, the
//! reservation state machine and the order status rules, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 REST layer (external collaborator)              │   │
//! │  │        POST /orders ──► PATCH /orders/{id}/status              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ in-process calls                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                tally-settlement (orchestrator)                  │   │
//! │  │     validate ──► reserve ──► charge ──► confirm / compensate    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌─────────────┐  ┌───────────┐  ┌──────────┐  │   │
//! │  │   │  ledger   │  │ reservation │  │   audit   │  │  ports   │  │   │
//! │  │   │ counters  │  │ hold/confirm│  │ append-   │  │ Store,   │  │   │
//! │  │   │ per SKU   │  │ /release    │  │ only log  │  │ Gateway  │  │   │
//! │  │   └───────────┘  └─────────────┘  └───────────┘  └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO TIMERS                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │        SQLite repositories implementing the port traits         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (ProductStock, Order, LineItem, StockChange, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Checkout request validation
//! - [`ledger`] - Per-product stock counters with atomic operations
//! - [`audit`] - Append-only stock-change audit trail
//! - [`reservation`] - All-or-nothing holds across an order's line items
//! - [`ports`] - Traits for the collaborators the orchestrator talks to
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use tally_core::ledger::InventoryLedger;
//! use tally_core::reservation::ReservationCoordinator;
//!
//! let ledger = Arc::new(InventoryLedger::in_memory());
//! ledger.initialize("MUG-01", 10, 2).unwrap();
//!
//! let coordinator = ReservationCoordinator::new(ledger.clone());
//! let mut hold = coordinator
//!     .hold_all("order-1", &[("MUG-01".to_string(), 4)])
//!     .unwrap();
//! coordinator.confirm(&mut hold).unwrap();
//!
//! let stock = ledger.snapshot("MUG-01").unwrap();
//! assert_eq!(stock.available, 6);
//! assert_eq!(stock.reserved, 0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod error;
pub mod ledger;
pub mod money;
pub mod ports;
pub mod reservation;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use audit::StockAuditTrail;
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::InventoryLedger;
pub use money::Money;
pub use ports::{ChargeOutcome, OrderStore, PaymentGateway, ProductCatalog, StoreError};
pub use reservation::{Reservation, ReservationCoordinator};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed in a single order.
pub const MAX_LINE_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// Guards against accidental over-ordering (typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Reorder threshold given to products introduced without one.
pub const DEFAULT_REORDER_THRESHOLD: i64 = 10;

/// Cancellation reason recorded when the payment step fails or times out.
pub const PAYMENT_FAILED_REASON: &str = "payment failed";

/// Tracing target used for conditions operators must be paged about.
pub const ALERT_TARGET: &str = "tally::alert";
