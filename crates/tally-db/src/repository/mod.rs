//! # Repository Module
//!
//! Database repositories for Tally.
//!
//! ## Repositories and Ports
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ProductRepository ────implements────► ProductCatalog                  │
//! │  ├── catalog rows (name, price)                                        │
//! │  └── stock records (load into / save from the InventoryLedger)         │
//! │                                                                         │
//! │  OrderRepository ──────implements────► OrderStore                      │
//! │  ├── orders + order_items, written in one transaction                  │
//! │  └── listing and statistics                                            │
//! │                                                                         │
//! │  StockChangeRepository                                                 │
//! │  └── durable copy of the StockAuditTrail (AuditFlusher)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queries are plain `sqlx::query` / `query_as` calls mapped through
//! `FromRow` row structs, so the crate builds without a live database.

pub mod order;
pub mod product;
pub mod stock_change;
