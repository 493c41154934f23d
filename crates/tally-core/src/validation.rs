//! # Validation Module
//!
//! Shape checks for checkout requests and ledger inputs.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: REST layer                                                   │
//! │  ├── Deserialization, auth                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Orchestrator                                                 │
//! │  └── THIS MODULE: shape of the request, before any side effect         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Catalog + Ledger                                             │
//! │  ├── Product exists, price lookup                                      │
//! │  └── Enough available stock                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_quantity, OrderLimits};
//!
//! let limits = OrderLimits::default();
//! assert!(validate_quantity(5, &limits).is_ok());
//! assert!(validate_quantity(0, &limits).is_err());
//! ```

use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::types::{OrderRequest, PaymentMethod};
use crate::{MAX_ITEM_QUANTITY, MAX_LINE_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of a product id.
pub const MAX_PRODUCT_ID_LEN: usize = 64;

/// Maximum length of a shipping or billing address.
pub const MAX_ADDRESS_LEN: usize = 500;

// =============================================================================
// Limits
// =============================================================================

/// Bounds applied to every checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLimits {
    pub max_line_items: usize,
    pub max_item_quantity: i64,
}

impl Default for OrderLimits {
    fn default() -> Self {
        OrderLimits {
            max_line_items: MAX_LINE_ITEMS,
            max_item_quantity: MAX_ITEM_QUANTITY,
        }
    }
}

/// A request that passed [`validate_order_request`].
///
/// Duplicate product ids are merged and the lines are sorted by product id,
/// which is also the order the ledger locks them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub user_id: String,
    pub lines: Vec<(String, i64)>,
    pub shipping_address: String,
    pub billing_address: Option<String>,
    pub payment_method: PaymentMethod,
}

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a product id.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
pub fn validate_product_id(product_id: &str) -> ValidationResult<()> {
    let product_id = product_id.trim();

    if product_id.is_empty() {
        return Err(ValidationError::required("product id"));
    }

    if product_id.len() > MAX_PRODUCT_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "product id".to_string(),
            max: MAX_PRODUCT_ID_LEN,
        });
    }

    Ok(())
}

/// Validates a line-item quantity.
///
/// ## Example
/// ```rust
/// use tally_core::validation::{validate_quantity, OrderLimits};
///
/// let limits = OrderLimits::default();
/// assert!(validate_quantity(1, &limits).is_ok());
/// assert!(validate_quantity(-1, &limits).is_err());
/// assert!(validate_quantity(1000, &limits).is_err());
/// ```
pub fn validate_quantity(quantity: i64, limits: &OrderLimits) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if quantity > limits.max_item_quantity {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: limits.max_item_quantity,
        });
    }

    Ok(())
}

/// Rejects zero and negative quantities passed to ledger operations.
pub fn ensure_positive(quantity: i64, field: &str) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn validate_address(value: Option<&str>, field: &str) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if value.len() > MAX_ADDRESS_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ADDRESS_LEN,
        });
    }

    Ok(Some(value.to_string()))
}

// =============================================================================
// Request Validator
// =============================================================================

/// Validates the shape of a checkout request.
///
/// Checks run in a fixed order so the first failure is deterministic:
/// user id, items, per-line product id and quantity, shipping address,
/// billing address, payment method.
pub fn validate_order_request(
    request: &OrderRequest,
    limits: &OrderLimits,
) -> ValidationResult<ValidatedOrder> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(ValidationError::required("user id"));
    }

    if request.items.is_empty() {
        return Err(ValidationError::required("order items"));
    }

    if request.items.len() > limits.max_line_items {
        return Err(ValidationError::OutOfRange {
            field: "order items".to_string(),
            min: 1,
            max: limits.max_line_items as i64,
        });
    }

    let mut merged: BTreeMap<String, i64> = BTreeMap::new();
    for line in &request.items {
        validate_product_id(&line.product_id)?;
        validate_quantity(line.quantity, limits)?;

        let total = merged.entry(line.product_id.trim().to_string()).or_insert(0);
        *total += line.quantity;
        if *total > limits.max_item_quantity {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 1,
                max: limits.max_item_quantity,
            });
        }
    }

    let shipping_address = validate_address(request.shipping_address.as_deref(), "shipping address")?
        .ok_or_else(|| ValidationError::required("shipping address"))?;
    let billing_address = validate_address(request.billing_address.as_deref(), "billing address")?;

    let payment_method = request
        .payment_method
        .ok_or_else(|| ValidationError::required("payment method"))?;

    Ok(ValidatedOrder {
        user_id: user_id.to_string(),
        lines: merged.into_iter().collect(),
        shipping_address,
        billing_address,
        payment_method,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
