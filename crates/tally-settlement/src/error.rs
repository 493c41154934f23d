//! # Settlement Error Types
//!
//! The error surface the REST layer maps onto responses.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Settlement Error Kinds                             │
//! │                                                                         │
//! │  ┌───────────────────┐  ┌───────────────────┐  ┌────────────────────┐  │
//! │  │  Client input     │  │  Business outcome │  │  Fault             │  │
//! │  │                   │  │                   │  │                    │  │
//! │  │  Validation       │  │  InsufficientStock│  │  InvalidReservation│  │
//! │  │  NotFound         │  │  PaymentFailed    │  │  State (alerted)   │  │
//! │  │  ProductNotFound  │  │  InvalidTransition│  │  Store             │  │
//! │  └───────────────────┘  └───────────────────┘  └────────────────────┘  │
//! │                                                                         │
//! │  Every compensation has already run when one of these is returned.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::{CoreError, OrderStatus, StoreError, ValidationError};
use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type SettlementResult<T> = Result<T, SettlementError>;

#[derive(Debug, Error)]
pub enum SettlementError {
    /// Malformed request. Nothing was reserved or written.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Not enough stock for one of the lines. Nothing was reserved or
    /// written.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// The charge was declined or timed out. The order exists and is
    /// CANCELLED; its stock was released.
    #[error("Payment failed for order {order_id}: {reason}")]
    PaymentFailed { order_id: String, reason: String },

    /// Ledger and reservation disagree. Logged on the alert target.
    #[error("Invalid reservation state for {subject}: {reason}")]
    InvalidReservationState { subject: String, reason: String },

    #[error("Cannot move order {order_id} from {from} to {to}: {reason}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
        reason: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// A collaborator (store, catalog) failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl SettlementError {
    pub fn invalid_transition(
        order_id: impl Into<String>,
        from: OrderStatus,
        to: OrderStatus,
        reason: impl Into<String>,
    ) -> Self {
        SettlementError::InvalidTransition {
            order_id: order_id.into(),
            from,
            to,
            reason: reason.into(),
        }
    }

    /// True for errors operators must investigate.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SettlementError::InvalidReservationState { .. })
    }
}

impl From<CoreError> for SettlementError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => SettlementError::ProductNotFound(id),
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => SettlementError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            CoreError::InvalidReservationState { subject, reason } => {
                SettlementError::InvalidReservationState { subject, reason }
            }
            CoreError::Validation(e) => SettlementError::Validation(e),
            CoreError::DuplicateProduct(id) => {
                SettlementError::Store(format!("stock record already exists for {id}"))
            }
        }
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => SettlementError::NotFound { entity, id },
            StoreError::Backend(msg) => SettlementError::Store(msg),
        }
    }
}
