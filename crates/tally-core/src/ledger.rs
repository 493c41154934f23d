//! # Inventory Ledger
//!
//! The authoritative per-product stock counters.
//!
//! ## Locking Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         InventoryLedger                                 │
//! │                                                                         │
//! │   RwLock<HashMap<product_id, Arc<Mutex<ProductStock>>>>                │
//! │      │                                                                  │
//! │      │ read lock only long enough to clone the slot Arc                 │
//! │      ▼                                                                  │
//! │   ┌──────────┐   ┌──────────┐   ┌──────────┐                            │
//! │   │ MUG-01   │   │ TEA-02   │   │ PEN-03   │   one Mutex per product    │
//! │   │ avail 10 │   │ avail 4  │   │ avail 0  │                            │
//! │   │ resv  0  │   │ resv  2  │   │ resv  1  │                            │
//! │   └────┬─────┘   └──────────┘   └──────────┘                            │
//! │        │                                                                │
//! │        │ check, mutate and audit happen under the same product lock     │
//! │        ▼                                                                │
//! │   StockAuditTrail::record()                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two checkouts touching different products never contend. Two checkouts
//! touching the same product serialize on its mutex, so the
//! `available >= qty` check and the decrement are one step.
//!
//! ## Counter Moves
//! ```text
//!   operation   available   reserved   total_stocked   total_confirmed
//!   ─────────   ─────────   ────────   ─────────────   ───────────────
//!   reserve        -q          +q            .                .
//!   confirm         .          -q            .               +q
//!   release        +q          -q            .                .
//!   restock        +q           .            .               -q
//!   adjust      → new           .        +(new-old)           .
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use tracing::debug;

use crate::audit::StockAuditTrail;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{InventorySummary, ProductStock, StockChangeKind};
use crate::validation::{ensure_positive, validate_product_id};

type Slot = Arc<Mutex<ProductStock>>;

/// Per-product stock counters with atomic operations.
///
/// Shared across checkout tasks behind an `Arc`.
#[derive(Debug)]
pub struct InventoryLedger {
    products: RwLock<HashMap<String, Slot>>,
    audit: Arc<StockAuditTrail>,
}

impl InventoryLedger {
    /// Creates an empty ledger that appends to `audit`.
    pub fn new(audit: Arc<StockAuditTrail>) -> Self {
        InventoryLedger {
            products: RwLock::new(HashMap::new()),
            audit,
        }
    }

    /// Creates an empty ledger with its own audit trail.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(StockAuditTrail::new()))
    }

    pub fn audit(&self) -> &Arc<StockAuditTrail> {
        &self.audit
    }

    // =========================================================================
    // Product Introduction
    // =========================================================================

    /// Introduces a product with all of `initial_stock` available.
    ///
    /// ## Errors
    /// - `DuplicateProduct` if the product already has a stock record
    /// - `Validation` for an empty id or negative quantities
    pub fn initialize(
        &self,
        product_id: &str,
        initial_stock: i64,
        reorder_threshold: i64,
    ) -> CoreResult<ProductStock> {
        validate_product_id(product_id)?;
        non_negative(initial_stock, "initial stock")?;
        non_negative(reorder_threshold, "reorder threshold")?;

        let mut products = self
            .products
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if products.contains_key(product_id) {
            return Err(CoreError::DuplicateProduct(product_id.to_string()));
        }

        let stock = ProductStock::new(product_id, initial_stock, reorder_threshold);
        let mut empty = stock.clone();
        empty.available = 0;
        empty.total_stocked = 0;

        debug!(product_id = %product_id, initial_stock, reorder_threshold, "Initializing stock record");
        self.audit
            .record(StockChangeKind::Initialize, &empty, &stock, "initial stock");
        products.insert(product_id.to_string(), Arc::new(Mutex::new(stock.clone())));

        Ok(stock)
    }

    /// Loads a previously persisted record without writing an audit entry.
    ///
    /// ## Errors
    /// - `DuplicateProduct` if the product is already loaded
    /// - `InvalidReservationState` if the record breaks conservation
    pub fn hydrate(&self, stock: ProductStock) -> CoreResult<()> {
        if !stock.is_consistent() {
            return Err(CoreError::invalid_state(
                &stock.product_id,
                format!(
                    "persisted counters are inconsistent: available {} reserved {} stocked {} confirmed {}",
                    stock.available, stock.reserved, stock.total_stocked, stock.total_confirmed
                ),
            ));
        }

        let mut products = self
            .products
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if products.contains_key(&stock.product_id) {
            return Err(CoreError::DuplicateProduct(stock.product_id));
        }

        debug!(product_id = %stock.product_id, available = stock.available, "Hydrating stock record");
        products.insert(stock.product_id.clone(), Arc::new(Mutex::new(stock)));
        Ok(())
    }

    // =========================================================================
    // Reservation Moves
    // =========================================================================

    /// Moves `quantity` units from available to reserved.
    ///
    /// ## Errors
    /// - `InsufficientStock` if fewer than `quantity` units are available
    /// - `ProductNotFound` for an unknown product
    pub fn reserve(&self, product_id: &str, quantity: i64, reason: &str) -> CoreResult<ProductStock> {
        ensure_positive(quantity, "quantity")?;

        self.mutate(product_id, StockChangeKind::Reserve, reason, |stock| {
            if stock.available < quantity {
                return Err(CoreError::InsufficientStock {
                    product_id: stock.product_id.clone(),
                    available: stock.available,
                    requested: quantity,
                });
            }
            stock.available -= quantity;
            stock.reserved += quantity;
            Ok(())
        })
    }

    /// Consumes `quantity` reserved units permanently (reserved → sold).
    pub fn confirm(&self, product_id: &str, quantity: i64, reason: &str) -> CoreResult<ProductStock> {
        ensure_positive(quantity, "quantity")?;

        self.mutate(product_id, StockChangeKind::Confirm, reason, |stock| {
            if quantity > stock.reserved {
                return Err(CoreError::invalid_state(
                    &stock.product_id,
                    format!("confirm {} exceeds reserved {}", quantity, stock.reserved),
                ));
            }
            stock.reserved -= quantity;
            stock.total_confirmed += quantity;
            Ok(())
        })
    }

    /// Returns `quantity` reserved units to available.
    pub fn release(&self, product_id: &str, quantity: i64, reason: &str) -> CoreResult<ProductStock> {
        ensure_positive(quantity, "quantity")?;

        self.mutate(product_id, StockChangeKind::Release, reason, |stock| {
            if quantity > stock.reserved {
                return Err(CoreError::invalid_state(
                    &stock.product_id,
                    format!("release {} exceeds reserved {}", quantity, stock.reserved),
                ));
            }
            stock.reserved -= quantity;
            stock.available += quantity;
            Ok(())
        })
    }

    /// Returns previously confirmed units to available stock.
    ///
    /// Used when a paid order is cancelled.
    pub fn restock(&self, product_id: &str, quantity: i64, reason: &str) -> CoreResult<ProductStock> {
        ensure_positive(quantity, "quantity")?;

        self.mutate(product_id, StockChangeKind::Restock, reason, |stock| {
            if quantity > stock.total_confirmed {
                return Err(CoreError::invalid_state(
                    &stock.product_id,
                    format!(
                        "restock {} exceeds confirmed {}",
                        quantity, stock.total_confirmed
                    ),
                ));
            }
            stock.total_confirmed -= quantity;
            stock.available += quantity;
            Ok(())
        })
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Sets available stock to `new_available` (clamped to zero).
    ///
    /// An administrative correction such as a shelf count. The difference is
    /// folded into `total_stocked` so conservation still holds.
    pub fn adjust_stock(
        &self,
        product_id: &str,
        new_available: i64,
        reason: &str,
    ) -> CoreResult<ProductStock> {
        let new_available = new_available.max(0);

        self.mutate(product_id, StockChangeKind::Adjust, reason, |stock| {
            let delta = new_available - stock.available;
            stock.available = new_available;
            stock.total_stocked += delta;
            Ok(())
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn needs_reorder(&self, product_id: &str) -> CoreResult<bool> {
        Ok(self.snapshot(product_id)?.needs_reorder())
    }

    /// A copy of the product's current counters.
    pub fn snapshot(&self, product_id: &str) -> CoreResult<ProductStock> {
        let slot = self.slot(product_id)?;
        let stock = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(stock.clone())
    }

    /// Copies of every record, sorted by product id.
    pub fn snapshots(&self) -> Vec<ProductStock> {
        let slots: Vec<Slot> = self
            .products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut all: Vec<ProductStock> = slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        all.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        all
    }

    /// Records at or below their reorder threshold.
    pub fn low_stock(&self) -> Vec<ProductStock> {
        self.snapshots()
            .into_iter()
            .filter(ProductStock::needs_reorder)
            .collect()
    }

    pub fn summary(&self) -> InventorySummary {
        self.snapshots()
            .iter()
            .fold(InventorySummary::default(), |mut acc, stock| {
                acc.total_products += 1;
                if stock.needs_reorder() {
                    acc.low_stock_products += 1;
                }
                if stock.is_out_of_stock() {
                    acc.out_of_stock_products += 1;
                }
                acc.total_available += stock.available;
                acc.total_reserved += stock.reserved;
                acc
            })
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(product_id)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn slot(&self, product_id: &str) -> CoreResult<Slot> {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(product_id)
            .cloned()
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))
    }

    /// Applies `change` to a working copy under the product lock.
    ///
    /// The stored record and the audit trail are only touched if `change`
    /// succeeds.
    fn mutate<F>(
        &self,
        product_id: &str,
        kind: StockChangeKind,
        reason: &str,
        change: F,
    ) -> CoreResult<ProductStock>
    where
        F: FnOnce(&mut ProductStock) -> CoreResult<()>,
    {
        let slot = self.slot(product_id)?;
        let mut stock = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = stock.clone();
        change(&mut next)?;
        next.updated_at = Utc::now();

        let entry = self.audit.record(kind, &stock, &next, reason);
        debug!(
            product_id = %product_id,
            kind = %kind,
            available = next.available,
            reserved = next.reserved,
            sequence = entry.sequence,
            "Stock mutated"
        );

        *stock = next.clone();
        Ok(next)
    }
}

fn non_negative(value: i64, field: &str) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ledger_with(product_id: &str, initial: i64) -> InventoryLedger {
        let ledger = InventoryLedger::in_memory();
        ledger.initialize(product_id, initial, 2).unwrap();
        ledger
    }

    #[test]
    fn test_initialize_and_duplicate() {
        let ledger = ledger_with("MUG-01", 10);
        let stock = ledger.snapshot("MUG-01").unwrap();
        assert_eq!(stock.available, 10);
        assert_eq!(stock.total_stocked, 10);

        assert!(matches!(
            ledger.initialize("MUG-01", 5, 2),
            Err(CoreError::DuplicateProduct(_))
        ));
        assert!(ledger.initialize("TEA-02", -1, 2).is_err());

        let entries = ledger.audit().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, StockChangeKind::Initialize);
        assert_eq!((entries[0].old_quantity, entries[0].new_quantity), (0, 10));
    }

    #[test]
    fn test_reserve_confirm_release() {
        let ledger = ledger_with("MUG-01", 10);

        let stock = ledger.reserve("MUG-01", 4, "o-1").unwrap();
        assert_eq!((stock.available, stock.reserved), (6, 4));

        let stock = ledger.confirm("MUG-01", 3, "o-1").unwrap();
        assert_eq!((stock.available, stock.reserved), (6, 1));
        assert_eq!(stock.total_confirmed, 3);

        let stock = ledger.release("MUG-01", 1, "o-1").unwrap();
        assert_eq!((stock.available, stock.reserved), (7, 0));
        assert!(stock.is_consistent());
    }

    #[test]
    fn test_insufficient_stock_leaves_counters_untouched() {
        let ledger = ledger_with("MUG-01", 3);
        let before_len = ledger.audit().len();

        let err = ledger.reserve("MUG-01", 5, "o-1").unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 3, requested: 5, .. }
        ));
        assert_eq!(ledger.snapshot("MUG-01").unwrap().available, 3);
        assert_eq!(ledger.audit().len(), before_len);
    }

    #[test]
    fn test_confirm_or_release_beyond_reserved_is_invalid() {
        let ledger = ledger_with("MUG-01", 10);
        ledger.reserve("MUG-01", 2, "o-1").unwrap();

        assert!(ledger.confirm("MUG-01", 3, "o-1").unwrap_err().is_fatal());
        assert!(ledger.release("MUG-01", 3, "o-1").unwrap_err().is_fatal());
        assert_eq!(ledger.snapshot("MUG-01").unwrap().reserved, 2);
    }

    #[test]
    fn test_non_positive_quantities_rejected() {
        let ledger = ledger_with("MUG-01", 10);
        assert!(matches!(
            ledger.reserve("MUG-01", 0, "o-1"),
            Err(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
        assert!(ledger.release("MUG-01", -1, "o-1").is_err());
    }

    #[test]
    fn test_unknown_product() {
        let ledger = InventoryLedger::in_memory();
        assert!(matches!(
            ledger.reserve("NOPE", 1, "o-1"),
            Err(CoreError::ProductNotFound(_))
        ));
        assert!(ledger.snapshot("NOPE").is_err());
    }

    #[test]
    fn test_adjust_stock_clamps_and_audits() {
        let ledger = ledger_with("MUG-01", 10);
        ledger.reserve("MUG-01", 3, "o-1").unwrap();

        let stock = ledger.adjust_stock("MUG-01", -4, "shrinkage").unwrap();
        assert_eq!(stock.available, 0);
        assert!(stock.is_consistent());

        let last = ledger.audit().entries().pop().unwrap();
        assert_eq!(last.kind, StockChangeKind::Adjust);
        assert_eq!((last.old_quantity, last.new_quantity, last.delta), (7, 0, -7));
        assert_eq!(last.reason, "shrinkage");
    }

    #[test]
    fn test_restock_limited_to_confirmed() {
        let ledger = ledger_with("MUG-01", 10);
        ledger.reserve("MUG-01", 4, "o-1").unwrap();
        ledger.confirm("MUG-01", 4, "o-1").unwrap();

        assert!(ledger.restock("MUG-01", 5, "cancel o-1").is_err());
        let stock = ledger.restock("MUG-01", 4, "cancel o-1").unwrap();
        assert_eq!(stock.available, 10);
        assert_eq!(stock.total_confirmed, 0);
        assert!(stock.is_consistent());
    }

    #[test]
    fn test_needs_reorder_and_summary() {
        let ledger = InventoryLedger::in_memory();
        ledger.initialize("MUG-01", 10, 10).unwrap();
        ledger.initialize("TEA-02", 50, 10).unwrap();
        ledger.initialize("PEN-03", 0, 5).unwrap();

        assert!(ledger.needs_reorder("MUG-01").unwrap());
        assert!(!ledger.needs_reorder("TEA-02").unwrap());

        let low: Vec<_> = ledger.low_stock().into_iter().map(|s| s.product_id).collect();
        assert_eq!(low, vec!["MUG-01".to_string(), "PEN-03".to_string()]);

        let summary = ledger.summary();
        assert_eq!(summary.total_products, 3);
        assert_eq!(summary.low_stock_products, 2);
        assert_eq!(summary.out_of_stock_products, 1);
        assert_eq!(summary.total_available, 60);
    }

    #[test]
    fn test_hydrate_rejects_inconsistent_record() {
        let ledger = InventoryLedger::in_memory();
        let mut stock = ProductStock::new("MUG-01", 10, 2);
        stock.reserved = 3;
        assert!(ledger.hydrate(stock.clone()).is_err());

        stock.total_stocked = 13;
        ledger.hydrate(stock).unwrap();
        assert_eq!(ledger.snapshot("MUG-01").unwrap().reserved, 3);
        assert!(ledger.audit().is_empty());
    }

    #[test]
    fn test_concurrent_reserves_never_oversell() {
        let ledger = Arc::new(ledger_with("MUG-01", 10));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || ledger.reserve("MUG-01", 1, &format!("o-{i}")).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 10);
        let stock = ledger.snapshot("MUG-01").unwrap();
        assert_eq!((stock.available, stock.reserved), (0, 10));
        assert!(stock.is_consistent());
    }
}
