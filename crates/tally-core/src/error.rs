//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Ledger / reservation failures                  │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-core ports                                                      │
//! │  └── StoreError       - Collaborator (store/catalog) failures          │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  tally-settlement errors                                               │
//! │  └── SettlementError  - What the REST layer sees                       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SettlementError → REST response   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger and reservation errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No stock record exists for the product.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Not enough available stock to hold the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (MUG-01 × 5)
    ///      │
    ///      ▼
    /// Ledger: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: "MUG-01", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Every earlier hold of this checkout is released, no order row written
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// The counters or the reservation do not support the requested move.
    ///
    /// ## When This Occurs
    /// - Confirming or releasing more units than are reserved
    /// - Restocking more units than were ever confirmed
    /// - Releasing a reservation that was already confirmed
    ///
    /// Outside of the release-after-confirm case this means the ledger and
    /// the reservations disagree. It is logged on the alert target.
    #[error("Invalid reservation state for {subject}: {reason}")]
    InvalidReservationState { subject: String, reason: String },

    /// A product was introduced twice.
    #[error("Stock record already exists for {0}")]
    DuplicateProduct(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Builds an [`CoreError::InvalidReservationState`].
    pub fn invalid_state(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidReservationState {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that indicate ledger corruption rather than a
    /// business outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::InvalidReservationState { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any side effect takes place.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    pub(crate) fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
