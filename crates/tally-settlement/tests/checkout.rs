//! Integration tests for `create_order`: reservation, payment and
//! compensation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tally_core::{
    ChargeOutcome, InventoryLedger, LineItem, Money, Order, OrderLineRequest, OrderStatus,
    OrderStore, PaymentGateway, PaymentMethod, StockChangeKind, StoreError,
    PAYMENT_FAILED_REASON,
};
use tally_settlement::{
    InMemoryOrderStore, RecordingObserver, SettlementConfig, SettlementError, SettlementEvent,
    SettlementOrchestrator, SimulatedGateway, StaticCatalog,
};

use common::{assert_conserved, request, Harness};

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn successful_checkout_settles_stock_and_order() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);
    let init_sequence = h.ledger.audit().last_sequence();

    let order = h
        .orchestrator
        .create_order(request("user-1", &[("P", 4)]))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total(), Money::from_cents(4000));
    assert!(order.paid_at.is_some());
    assert!(order.settlement_id.as_deref().unwrap().starts_with("cc_"));

    let stock = h.stock("P");
    assert_eq!(stock.available, 6);
    assert_eq!(stock.reserved, 0);
    assert_eq!(stock.total_confirmed, 4);
    assert_conserved(&stock);

    let moved_available: Vec<_> = h
        .ledger
        .audit()
        .entries_since(init_sequence)
        .into_iter()
        .filter(|c| c.old_quantity != c.new_quantity)
        .collect();
    assert_eq!(moved_available.len(), 1);
    assert_eq!(moved_available[0].kind, StockChangeKind::Reserve);
    assert_eq!(moved_available[0].old_quantity, 10);
    assert_eq!(moved_available[0].new_quantity, 6);

    let stored = h.store.all().await;
    assert_eq!(stored, vec![order.clone()]);
    assert_eq!(h.gateway.attempts(), 1);

    let events = h.recorder.events_for(&order.id);
    assert!(matches!(events[0], SettlementEvent::OrderPlaced { .. }));
    assert!(matches!(events[1], SettlementEvent::OrderPaid { .. }));
}

#[tokio::test]
async fn total_uses_catalog_price_not_client_price() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);

    let mut req = request("user-1", &[]);
    req.items = vec![OrderLineRequest {
        product_id: "P".to_string(),
        quantity: 3,
        unit_price_cents: Some(1),
    }];

    let order = h.orchestrator.create_order(req).await.unwrap();
    assert_eq!(order.total_cents, 3000);
    assert_eq!(order.items[0].unit_price_cents, 1000);
    assert_eq!(order.items[0].product_name, "Product P");
}

#[tokio::test]
async fn duplicate_lines_are_merged() {
    let h = Harness::new(&[("P", 10, 2, 250)]);

    let order = h
        .orchestrator
        .create_order(request("user-1", &[("P", 2), ("P", 3)]))
        .await
        .unwrap();

    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 5);
    assert_eq!(order.total_cents, 1250);
    assert_eq!(h.stock("P").available, 5);
}

#[tokio::test]
async fn low_stock_is_reported_after_settlement() {
    let h = Harness::new(&[("P", 10, 5, 100), ("Q", 10, 2, 100)]);

    h.orchestrator
        .create_order(request("user-1", &[("P", 6), ("Q", 1)]))
        .await
        .unwrap();

    let low: Vec<_> = h
        .recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SettlementEvent::LowStock { product_id, available, .. } => Some((product_id, available)),
            _ => None,
        })
        .collect();
    assert_eq!(low, vec![("P".to_string(), 4)]);
    assert_eq!(h.orchestrator.low_stock().len(), 1);
}

// ============================================================================
// Payment Failure
// ============================================================================

#[tokio::test]
async fn declined_payment_releases_stock_and_cancels() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);
    h.gateway.set_declining(true);

    let err = h
        .orchestrator
        .create_order(request("user-1", &[("P", 3)]))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::PaymentFailed { ref reason, .. } if reason == "payment declined"));

    let stock = h.stock("P");
    assert_eq!(stock.available, 10);
    assert_eq!(stock.reserved, 0);
    assert_conserved(&stock);

    let orders = h.store.all().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Cancelled);
    assert_eq!(orders[0].cancellation_reason.as_deref(), Some(PAYMENT_FAILED_REASON));
    assert!(orders[0].cancelled_at.is_some());
    assert!(orders[0].settlement_id.is_none());

    let events = h.recorder.events_for(&orders[0].id);
    assert!(matches!(
        events.last(),
        Some(SettlementEvent::OrderCancelled { from: OrderStatus::Pending, .. })
    ));
}

#[tokio::test]
async fn charge_over_gateway_limit_fails() {
    let h = Harness::build(
        &[("P", 10, 2, 1000)],
        SimulatedGateway::default().with_max_charge(Money::from_cents(2500)),
        SettlementConfig::default(),
    );

    let err = h
        .orchestrator
        .create_order(request("user-1", &[("P", 3)]))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::PaymentFailed { ref reason, .. } if reason.contains("exceeds limit")));
    assert_eq!(h.stock("P").available, 10);
}

#[tokio::test]
async fn payment_timeout_releases_stock() {
    let mut config = SettlementConfig::default();
    config.settlement.payment_timeout_ms = 20;
    let h = Harness::build(
        &[("P", 10, 2, 1000)],
        SimulatedGateway::default().with_latency(Duration::from_millis(500)),
        config,
    );

    let err = h
        .orchestrator
        .create_order(request("user-1", &[("P", 3)]))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::PaymentFailed { ref reason, .. } if reason == "payment timed out"));

    let stock = h.stock("P");
    assert_eq!(stock.available, 10);
    assert_eq!(stock.reserved, 0);

    let orders = h.store.all().await;
    assert_eq!(orders[0].status, OrderStatus::Cancelled);
    assert_eq!(h.gateway.attempts(), 1);
}

// ============================================================================
// Rejected Before Any Side Effect
// ============================================================================

#[tokio::test]
async fn invalid_request_has_no_side_effects() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);

    let mut req = request("user-1", &[("P", 1)]);
    req.shipping_address = None;
    let err = h.orchestrator.create_order(req).await.unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));

    let err = h
        .orchestrator
        .create_order(request("user-1", &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));

    let err = h
        .orchestrator
        .create_order(request("user-1", &[("P", 0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));

    assert!(h.store.is_empty().await);
    assert_eq!(h.stock("P").available, 10);
    assert_eq!(h.gateway.attempts(), 0);
}

#[tokio::test]
async fn unknown_product_is_rejected() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);

    let err = h
        .orchestrator
        .create_order(request("user-1", &[("P", 1), ("NOPE", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::ProductNotFound(ref id) if id == "NOPE"));
    assert_eq!(h.stock("P").available, 10);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn hold_is_all_or_nothing() {
    let mut config = SettlementConfig::default();
    config.settlement.max_item_quantity = 1_000_000;
    let h = Harness::build(
        &[("P1", 10, 2, 100), ("P2", 10, 2, 100)],
        SimulatedGateway::default(),
        config,
    );

    let err = h
        .orchestrator
        .create_order(request("user-1", &[("P1", 5), ("P2", 1_000_000)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::InsufficientStock { ref product_id, available: 10, requested: 1_000_000 }
            if product_id == "P2"
    ));

    let p1 = h.stock("P1");
    assert_eq!(p1.available, 10);
    assert_eq!(p1.reserved, 0);
    assert!(h.store.is_empty().await);
    assert_eq!(h.gateway.attempts(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_oversell() {
    let h = Harness::new(&[("P", 10, 0, 100)]);
    let orchestrator = Arc::new(h.orchestrator.clone());

    let handles: Vec<_> = (0..50)
        .map(|n| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .create_order(request(&format!("user-{n}"), &[("P", 1)]))
                    .await
            })
        })
        .collect();

    let mut paid = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => {
                assert_eq!(order.status, OrderStatus::Paid);
                paid += 1;
            }
            Err(SettlementError::InsufficientStock { .. }) => out_of_stock += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(paid, 10);
    assert_eq!(out_of_stock, 40);

    let stock = h.stock("P");
    assert_eq!(stock.available, 0);
    assert_eq!(stock.reserved, 0);
    assert_eq!(stock.total_confirmed, 10);
    assert_conserved(&stock);
    assert_eq!(h.store.statistics().await.paid_orders, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_checkout_releases_held_stock() {
    let h = Harness::build(
        &[("P", 10, 2, 1000)],
        SimulatedGateway::default().with_latency(Duration::from_secs(30)),
        SettlementConfig::default(),
    );
    let orchestrator = h.orchestrator.clone();

    let handle = tokio::spawn(async move {
        orchestrator
            .create_order(request("user-1", &[("P", 3)]))
            .await
    });

    h.wait_for_reserved("P", 3).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    let stock = h.stock("P");
    assert_eq!(stock.available, 10);
    assert_eq!(stock.reserved, 0);
    assert_conserved(&stock);
}

// ============================================================================
// Store Failure
// ============================================================================

/// Refuses every write.
struct BrokenStore;

#[async_trait]
impl OrderStore for BrokenStore {
    async fn save(&self, _order: &Order) -> Result<Order, StoreError> {
        Err(StoreError::Backend("disk full".into()))
    }

    async fn find_by_id(&self, _order_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(None)
    }

    async fn find_line_items(&self, order_id: &str) -> Result<Vec<LineItem>, StoreError> {
        Err(StoreError::not_found("order", order_id))
    }
}

#[tokio::test]
async fn failed_pending_write_releases_reservation() {
    let ledger = Arc::new(InventoryLedger::in_memory());
    ledger.initialize("P", 10, 2).unwrap();
    let gateway = Arc::new(SimulatedGateway::default());

    let orchestrator = SettlementOrchestrator::new(
        ledger.clone(),
        Arc::new(BrokenStore),
        gateway.clone(),
        Arc::new(StaticCatalog::new().with_product("P", "Widget", Money::from_cents(100))),
        &SettlementConfig::default(),
    );

    let err = orchestrator
        .create_order(request("user-1", &[("P", 4)]))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Store(ref msg) if msg == "disk full"));

    let stock = ledger.snapshot("P").unwrap();
    assert_eq!(stock.available, 10);
    assert_eq!(stock.reserved, 0);
    assert_eq!(gateway.attempts(), 0);
}

// ============================================================================
// Confirm Failure
// ============================================================================

/// Approves every charge, but first drops the hold on `P2` behind the
/// orchestrator's back.
struct ReleasingGateway {
    ledger: Arc<InventoryLedger>,
}

#[async_trait]
impl PaymentGateway for ReleasingGateway {
    async fn charge(&self, _amount: Money, _method: PaymentMethod, order_id: &str) -> ChargeOutcome {
        self.ledger.release("P2", 2, "out-of-band release").unwrap();
        ChargeOutcome::approved(format!("txn-{order_id}"))
    }
}

#[tokio::test]
async fn confirm_failure_after_approval_is_a_reservation_fault() {
    let ledger = Arc::new(InventoryLedger::in_memory());
    ledger.initialize("P1", 10, 2).unwrap();
    ledger.initialize("P2", 5, 1).unwrap();

    let store = Arc::new(InMemoryOrderStore::new());
    let recorder = Arc::new(RecordingObserver::new());
    let orchestrator = SettlementOrchestrator::new(
        ledger.clone(),
        store.clone(),
        Arc::new(ReleasingGateway { ledger: ledger.clone() }),
        Arc::new(
            StaticCatalog::new()
                .with_product("P1", "Widget", Money::from_cents(500))
                .with_product("P2", "Gadget", Money::from_cents(700)),
        ),
        &SettlementConfig::default(),
    )
    .with_observer(recorder.clone());

    let err = orchestrator
        .create_order(request("user-1", &[("P1", 2), ("P2", 2)]))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidReservationState { .. }));
    assert!(err.is_fatal());

    // P1 confirmed before P2 failed; its units stay sold.
    let p1 = ledger.snapshot("P1").unwrap();
    assert_eq!((p1.available, p1.reserved, p1.total_confirmed), (8, 0, 2));
    assert_conserved(&p1);

    // P2's hold was already returned out of band and is not returned twice.
    let p2 = ledger.snapshot("P2").unwrap();
    assert_eq!((p2.available, p2.reserved, p2.total_confirmed), (5, 0, 0));
    assert_conserved(&p2);

    let orders = store.all().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Pending);
    assert!(orders[0].settlement_id.is_none());

    let events = recorder.events_for(&orders[0].id);
    assert!(events
        .iter()
        .any(|e| matches!(e, SettlementEvent::ReservationFault { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SettlementEvent::OrderPaid { .. })));
}
