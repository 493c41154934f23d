//! Integration tests for `update_order_status` and the read paths.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tally_core::{
    InventoryLedger, LineItem, Money, Order, OrderStatus, OrderStore, StockChangeKind, StoreError,
};
use tally_settlement::{
    InMemoryOrderStore, SettlementConfig, SettlementError, SettlementEvent,
    SettlementOrchestrator, SimulatedGateway, StaticCatalog,
};

use common::{assert_conserved, pending_order, request, Harness};

async fn paid_order(h: &Harness, quantity: i64) -> String {
    h.orchestrator
        .create_order(request("user-1", &[("P", quantity)]))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn paid_order_ships_and_delivers() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);
    let id = paid_order(&h, 2).await;

    let shipped = h
        .orchestrator
        .update_order_status(&id, OrderStatus::Shipped, None)
        .await
        .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert!(shipped.shipped_at.is_some());

    let delivered = h
        .orchestrator
        .update_order_status(&id, OrderStatus::Delivered, None)
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.delivered_at.is_some());
    assert_eq!(h.orchestrator.get_order(&id).await.unwrap(), delivered);

    let changes: Vec<_> = h
        .recorder
        .events_for(&id)
        .into_iter()
        .filter_map(|e| match e {
            SettlementEvent::StatusChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            (OrderStatus::Paid, OrderStatus::Shipped),
            (OrderStatus::Shipped, OrderStatus::Delivered),
        ]
    );

    // Shipping never moves stock.
    assert_eq!(h.stock("P").available, 8);
}

#[tokio::test]
async fn cancelling_paid_order_restocks() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);
    let id = paid_order(&h, 4).await;
    assert_eq!(h.stock("P").available, 6);

    let cancelled = h
        .orchestrator
        .update_order_status(&id, OrderStatus::Cancelled, Some("customer request"))
        .await
        .unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("customer request"));
    assert!(cancelled.cancelled_at.is_some());

    let stock = h.stock("P");
    assert_eq!(stock.available, 10);
    assert_eq!(stock.total_confirmed, 0);
    assert_conserved(&stock);

    let restock = h
        .ledger
        .audit()
        .entries_for("P")
        .into_iter()
        .find(|c| c.kind == StockChangeKind::Restock)
        .unwrap();
    assert_eq!(restock.delta, 4);
    assert!(restock.reason.contains("customer request"));

    assert!(h.recorder.events_for(&id).iter().any(|e| matches!(
        e,
        SettlementEvent::OrderCancelled { from: OrderStatus::Paid, .. }
    )));
}

/// Rejects the first CANCELLED write, then stores normally.
#[derive(Default)]
struct FlakyCancelStore {
    inner: InMemoryOrderStore,
    tripped: AtomicBool,
}

#[async_trait]
impl OrderStore for FlakyCancelStore {
    async fn save(&self, order: &Order) -> Result<Order, StoreError> {
        if order.status == OrderStatus::Cancelled && !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Backend("write timed out".into()));
        }
        self.inner.save(order).await
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        self.inner.find_by_id(order_id).await
    }

    async fn find_line_items(&self, order_id: &str) -> Result<Vec<LineItem>, StoreError> {
        self.inner.find_line_items(order_id).await
    }
}

#[tokio::test]
async fn failed_cancel_write_moves_no_stock_and_retries_cleanly() {
    let ledger = Arc::new(InventoryLedger::in_memory());
    ledger.initialize("P", 10, 2).unwrap();
    let orchestrator = SettlementOrchestrator::new(
        ledger.clone(),
        Arc::new(FlakyCancelStore::default()),
        Arc::new(SimulatedGateway::default()),
        Arc::new(StaticCatalog::new().with_product("P", "Widget", Money::from_cents(1000))),
        &SettlementConfig::default(),
    );

    let first = orchestrator
        .create_order(request("user-1", &[("P", 4)]))
        .await
        .unwrap();
    let second = orchestrator
        .create_order(request("user-2", &[("P", 4)]))
        .await
        .unwrap();
    assert_eq!(ledger.snapshot("P").unwrap().available, 2);

    let err = orchestrator
        .update_order_status(&first.id, OrderStatus::Cancelled, Some("customer request"))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Store(ref msg) if msg == "write timed out"));

    let stock = ledger.snapshot("P").unwrap();
    assert_eq!(stock.available, 2);
    assert_eq!(stock.total_confirmed, 8);
    assert_eq!(orchestrator.get_order(&first.id).await.unwrap().status, OrderStatus::Paid);

    orchestrator
        .update_order_status(&first.id, OrderStatus::Cancelled, Some("customer request"))
        .await
        .unwrap();

    let stock = ledger.snapshot("P").unwrap();
    assert_eq!(stock.available, 6);
    assert_eq!(stock.total_confirmed, 4);
    assert_conserved(&stock);

    let restocks = ledger
        .audit()
        .entries_for("P")
        .into_iter()
        .filter(|c| c.kind == StockChangeKind::Restock)
        .count();
    assert_eq!(restocks, 1);
    assert_eq!(orchestrator.get_order(&second.id).await.unwrap().status, OrderStatus::Paid);
}

#[tokio::test]
async fn failed_restock_leaves_order_cancelled_and_units_out() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);
    let id = paid_order(&h, 4).await;

    // Confirmed units already credited back out of band.
    h.ledger.restock("P", 4, "manual correction").unwrap();

    let err = h
        .orchestrator
        .update_order_status(&id, OrderStatus::Cancelled, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidReservationState { ref subject, .. } if *subject == id));

    assert_eq!(h.orchestrator.get_order(&id).await.unwrap().status, OrderStatus::Cancelled);
    let stock = h.stock("P");
    assert_eq!(stock.available, 10);
    assert_eq!(stock.total_confirmed, 0);
    assert_conserved(&stock);

    assert!(h
        .recorder
        .events_for(&id)
        .iter()
        .any(|e| matches!(e, SettlementEvent::ReservationFault { .. })));

    // Already CANCELLED, so a retry cannot credit the units a second time.
    let err = h
        .orchestrator
        .update_order_status(&id, OrderStatus::Cancelled, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition { .. }));
    assert_eq!(h.stock("P").available, 10);
}

#[tokio::test]
async fn cancelling_pending_order_moves_no_stock() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);
    h.store.save(&pending_order("o-pending", "P", 3, 1000)).await.unwrap();

    let cancelled = h
        .orchestrator
        .update_order_status("o-pending", OrderStatus::Cancelled, Some("abandoned"))
        .await
        .unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    let stock = h.stock("P");
    assert_eq!(stock.available, 10);
    assert_eq!(stock.reserved, 0);
}

#[tokio::test]
async fn disallowed_transitions_are_rejected() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);
    let id = paid_order(&h, 1).await;

    let err = h
        .orchestrator
        .update_order_status(&id, OrderStatus::Pending, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::InvalidTransition { from: OrderStatus::Paid, to: OrderStatus::Pending, .. }
    ));

    let err = h
        .orchestrator
        .update_order_status(&id, OrderStatus::Delivered, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition { .. }));

    h.orchestrator
        .update_order_status(&id, OrderStatus::Shipped, None)
        .await
        .unwrap();
    let err = h
        .orchestrator
        .update_order_status(&id, OrderStatus::Cancelled, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::InvalidTransition { from: OrderStatus::Shipped, to: OrderStatus::Cancelled, .. }
    ));

    assert_eq!(h.orchestrator.get_order(&id).await.unwrap().status, OrderStatus::Shipped);
    assert_eq!(h.stock("P").total_confirmed, 1);
}

#[tokio::test]
async fn paid_is_only_set_by_checkout() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);
    h.store.save(&pending_order("o-pending", "P", 1, 1000)).await.unwrap();

    let err = h
        .orchestrator
        .update_order_status("o-pending", OrderStatus::Paid, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Paid, .. }
    ));
}

#[tokio::test]
async fn terminal_orders_stay_terminal() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);
    let id = paid_order(&h, 2).await;

    h.orchestrator
        .update_order_status(&id, OrderStatus::Cancelled, None)
        .await
        .unwrap();
    let err = h
        .orchestrator
        .update_order_status(&id, OrderStatus::Cancelled, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition { .. }));

    // A second cancel must not restock again.
    let stock = h.stock("P");
    assert_eq!(stock.available, 10);
    assert_conserved(&stock);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let h = Harness::new(&[("P", 10, 2, 1000)]);

    let err = h
        .orchestrator
        .update_order_status("missing", OrderStatus::Shipped, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::NotFound { entity: "order", .. }));

    assert!(matches!(
        h.orchestrator.get_order("missing").await,
        Err(SettlementError::NotFound { .. })
    ));
    assert!(matches!(
        h.orchestrator.line_items("missing").await,
        Err(SettlementError::NotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn in_flight_checkout_cannot_be_cancelled() {
    let h = Harness::build(
        &[("P", 10, 2, 1000)],
        SimulatedGateway::default().with_latency(Duration::from_millis(300)),
        SettlementConfig::default(),
    );
    let orchestrator = h.orchestrator.clone();
    let checkout = tokio::spawn(async move {
        orchestrator
            .create_order(request("user-1", &[("P", 3)]))
            .await
    });

    let mut pending = None;
    for _ in 0..100 {
        if let Some(order) = h.store.all().await.into_iter().next() {
            pending = Some(order);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let pending = pending.expect("checkout never persisted its pending order");
    assert_eq!(pending.status, OrderStatus::Pending);

    let err = h
        .orchestrator
        .update_order_status(&pending.id, OrderStatus::Cancelled, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::InvalidTransition { ref reason, .. } if reason == "operation in progress"
    ));

    let order = checkout.await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(h.stock("P").available, 7);
}

#[tokio::test]
async fn read_paths_return_line_items_and_summary() {
    let h = Harness::new(&[("P", 10, 2, 1000), ("Q", 5, 1, 300)]);

    let order = h
        .orchestrator
        .create_order(request("user-1", &[("P", 1), ("Q", 2)]))
        .await
        .unwrap();

    let items = h.orchestrator.line_items(&order.id).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items.iter().map(|i| i.line_total().unwrap().cents()).sum::<i64>(), 1600);

    let summary = h.orchestrator.inventory_summary();
    assert_eq!(summary.total_products, 2);
    assert_eq!(summary.total_available, 12);
    assert_eq!(summary.total_reserved, 0);
}
