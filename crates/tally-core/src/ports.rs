//! # Collaborator Ports
//!
//! Traits for the systems the orchestrator talks to but does not own.
//!
//! ```text
//!                      ┌──────────────────────────┐
//!                      │  SettlementOrchestrator  │
//!                      └──┬──────────┬─────────┬──┘
//!                         │          │         │
//!            Arc<dyn ...> ▼          ▼         ▼
//!               ┌────────────┐ ┌──────────┐ ┌────────────────┐
//!               │ OrderStore │ │ Payment  │ │ ProductCatalog │
//!               │            │ │ Gateway  │ │                │
//!               └─────┬──────┘ └────┬─────┘ └───────┬────────┘
//!                     │             │               │
//!          OrderRepository   SimulatedGateway  ProductRepository
//!          InMemoryOrderStore  (or a real PSP)   StaticCatalog
//! ```
//!
//! Implementations are injected, never looked up globally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;
use crate::types::{LineItem, Order, PaymentMethod};

// =============================================================================
// Store Error
// =============================================================================

/// Failure reported by a store or catalog implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Anything else the backend reports (connection loss, constraint, ...).
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

// =============================================================================
// Order Store
// =============================================================================

/// Durable persistence of the order aggregate.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts or replaces the order together with its line items.
    async fn save(&self, order: &Order) -> Result<Order, StoreError>;

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>, StoreError>;

    async fn find_line_items(&self, order_id: &str) -> Result<Vec<LineItem>, StoreError>;
}

// =============================================================================
// Payment Gateway
// =============================================================================

/// Result of a single charge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeOutcome {
    pub success: bool,
    pub settlement_id: Option<String>,
    pub error_message: Option<String>,
}

impl ChargeOutcome {
    pub fn approved(settlement_id: impl Into<String>) -> Self {
        ChargeOutcome {
            success: true,
            settlement_id: Some(settlement_id.into()),
            error_message: None,
        }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        ChargeOutcome {
            success: false,
            settlement_id: None,
            error_message: Some(message.into()),
        }
    }
}

/// Settles a charge. Called at most once per order.
///
/// Transport errors are reported as a declined outcome; retries, if any,
/// live inside the implementation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, amount: Money, method: PaymentMethod, order_id: &str) -> ChargeOutcome;
}

// =============================================================================
// Product Catalog
// =============================================================================

/// Current product data. Prices returned here are the only prices used to
/// compute order totals.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_price(&self, product_id: &str) -> Result<Money, StoreError>;

    async fn get_name(&self, product_id: &str) -> Result<String, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FixedCatalog;

    #[async_trait]
    impl ProductCatalog for FixedCatalog {
        async fn get_price(&self, product_id: &str) -> Result<Money, StoreError> {
            match product_id {
                "MUG-01" => Ok(Money::from_cents(1250)),
                other => Err(StoreError::not_found("product", other)),
            }
        }

        async fn get_name(&self, product_id: &str) -> Result<String, StoreError> {
            self.get_price(product_id).await.map(|_| "Mug".to_string())
        }
    }

    #[tokio::test]
    async fn test_catalog_is_object_safe() {
        let catalog: Arc<dyn ProductCatalog> = Arc::new(FixedCatalog);
        assert_eq!(catalog.get_price("MUG-01").await.unwrap().cents(), 1250);

        let err = catalog.get_name("NOPE").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "product not found: NOPE");
    }

    #[test]
    fn test_charge_outcomes() {
        let ok = ChargeOutcome::approved("cc_123");
        assert!(ok.success);
        assert_eq!(ok.settlement_id.as_deref(), Some("cc_123"));

        let declined = ChargeOutcome::declined("card declined");
        assert!(!declined.success);
        assert!(declined.settlement_id.is_none());
    }
}
