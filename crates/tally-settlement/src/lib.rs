//! # tally-settlement: Checkout Orchestration for Tally
//!
//! Wires the inventory ledger to an order store, a payment gateway and a
//! product catalog, and drives every order through its status machine.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Settlement Architecture                            │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │              SettlementOrchestrator (one per process)            │  │
//! │  │                                                                  │  │
//! │  │  create_order: validate → price → hold → charge → settle/undo   │  │
//! │  │  update_order_status: ship, deliver, cancel (+ restock)         │  │
//! │  └───────┬──────────────────┬──────────────────┬────────────────────┘  │
//! │          │                  │                  │                        │
//! │          ▼                  ▼                  ▼                        │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────────────────┐   │
//! │  │ Reservation   │  │ Ports         │  │ Observers                 │   │
//! │  │ Coordinator   │  │               │  │                           │   │
//! │  │ (tally-core)  │  │ OrderStore    │  │ TracingObserver           │   │
//! │  │               │  │ PaymentGateway│  │ RecordingObserver         │   │
//! │  │ InventoryLedger│ │ ProductCatalog│  │ (audit export, alerts)    │   │
//! │  └───────────────┘  └───────────────┘  └───────────────────────────┘   │
//! │                                                                         │
//! │  ADAPTERS                                                              │
//! │  • memory: InMemoryOrderStore, StaticCatalog                           │
//! │  • gateway: SimulatedGateway (cc_/pp_/bt_ settlement ids)              │
//! │  • tally-db: OrderRepository, ProductRepository (SQLite)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`orchestrator`] - `SettlementOrchestrator`
//! - [`config`] - Settlement configuration (TOML + environment)
//! - [`error`] - Settlement error types
//! - [`events`] - Settlement events and observers
//! - [`gateway`] - Simulated payment gateway
//! - [`memory`] - In-memory order store and catalog
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_core::{InventoryLedger, Money, OrderLineRequest, OrderRequest, PaymentMethod};
//! use tally_settlement::{
//!     InMemoryOrderStore, SettlementConfig, SettlementOrchestrator, SimulatedGateway,
//!     StaticCatalog,
//! };
//!
//! let ledger = Arc::new(InventoryLedger::in_memory());
//! ledger.initialize("MUG-01", 10, 2)?;
//!
//! let orchestrator = SettlementOrchestrator::new(
//!     ledger,
//!     Arc::new(InMemoryOrderStore::new()),
//!     Arc::new(SimulatedGateway::default()),
//!     Arc::new(StaticCatalog::new().with_product("MUG-01", "Mug", Money::from_cents(1250))),
//!     &SettlementConfig::default(),
//! );
//!
//! let order = orchestrator
//!     .create_order(OrderRequest {
//!         user_id: "user-1".into(),
//!         items: vec![OrderLineRequest::new("MUG-01", 2)],
//!         shipping_address: Some("1 Main St".into()),
//!         billing_address: None,
//!         payment_method: Some(PaymentMethod::CreditCard),
//!     })
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod memory;
pub mod orchestrator;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, SettlementConfig};
pub use error::{SettlementError, SettlementResult};
pub use events::{RecordingObserver, SettlementEvent, SettlementObserver, TracingObserver};
pub use gateway::SimulatedGateway;
pub use memory::{InMemoryOrderStore, StaticCatalog};
pub use orchestrator::SettlementOrchestrator;
