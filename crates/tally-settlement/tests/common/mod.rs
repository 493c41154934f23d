//! Shared fixtures for the settlement integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tally_core::{
    InventoryLedger, LineItem, Money, Order, OrderLineRequest, OrderRequest, OrderStatus,
    PaymentMethod, ProductStock,
};
use tally_settlement::{
    InMemoryOrderStore, RecordingObserver, SettlementConfig, SettlementOrchestrator,
    SimulatedGateway, StaticCatalog,
};

/// (id, opening stock, reorder threshold, price in cents)
pub type ProductSpec = (&'static str, i64, i64, i64);

pub struct Harness {
    pub ledger: Arc<InventoryLedger>,
    pub store: Arc<InMemoryOrderStore>,
    pub gateway: Arc<SimulatedGateway>,
    pub recorder: Arc<RecordingObserver>,
    pub orchestrator: SettlementOrchestrator,
}

impl Harness {
    pub fn new(products: &[ProductSpec]) -> Self {
        Self::build(products, SimulatedGateway::default(), SettlementConfig::default())
    }

    pub fn build(
        products: &[ProductSpec],
        gateway: SimulatedGateway,
        config: SettlementConfig,
    ) -> Self {
        let ledger = Arc::new(InventoryLedger::in_memory());
        let mut catalog = StaticCatalog::new();
        for (id, stock, threshold, price) in products {
            ledger.initialize(id, *stock, *threshold).unwrap();
            catalog = catalog.with_product(*id, format!("Product {id}"), Money::from_cents(*price));
        }

        let store = Arc::new(InMemoryOrderStore::new());
        let gateway = Arc::new(gateway);
        let recorder = Arc::new(RecordingObserver::new());

        let orchestrator = SettlementOrchestrator::new(
            ledger.clone(),
            store.clone(),
            gateway.clone(),
            Arc::new(catalog),
            &config,
        )
        .with_observer(recorder.clone());

        Harness {
            ledger,
            store,
            gateway,
            recorder,
            orchestrator,
        }
    }

    pub fn stock(&self, product_id: &str) -> ProductStock {
        self.ledger.snapshot(product_id).unwrap()
    }

    /// Polls until `product_id` has `reserved` units held.
    pub async fn wait_for_reserved(&self, product_id: &str, reserved: i64) {
        for _ in 0..200 {
            if self.stock(product_id).reserved == reserved {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{product_id} never reached {reserved} reserved units");
    }
}

pub fn request(user_id: &str, items: &[(&str, i64)]) -> OrderRequest {
    OrderRequest {
        user_id: user_id.to_string(),
        items: items
            .iter()
            .map(|(product_id, quantity)| OrderLineRequest::new(*product_id, *quantity))
            .collect(),
        shipping_address: Some("1 Main St".to_string()),
        billing_address: None,
        payment_method: Some(PaymentMethod::CreditCard),
    }
}

/// A PENDING order that never went through checkout.
pub fn pending_order(id: &str, product_id: &str, quantity: i64, unit_price_cents: i64) -> Order {
    let now = Utc::now();
    Order {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        items: vec![LineItem {
            product_id: product_id.to_string(),
            product_name: format!("Product {product_id}"),
            quantity,
            unit_price_cents,
        }],
        total_cents: quantity * unit_price_cents,
        status: OrderStatus::Pending,
        shipping_address: "1 Main St".to_string(),
        billing_address: None,
        payment_method: PaymentMethod::BankTransfer,
        settlement_id: None,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
        paid_at: None,
        shipped_at: None,
        delivered_at: None,
        cancelled_at: None,
    }
}

pub fn assert_conserved(stock: &ProductStock) {
    assert_eq!(
        stock.available + stock.reserved,
        stock.total_stocked - stock.total_confirmed,
        "conservation broken for {}",
        stock.product_id
    );
}
