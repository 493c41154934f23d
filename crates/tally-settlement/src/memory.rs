//! In-memory [`OrderStore`] and [`ProductCatalog`] implementations, for
//! tests and for running the orchestrator without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use tally_core::{
    LineItem, Money, Order, OrderStatistics, OrderStore, ProductCatalog, StoreError,
};

// =============================================================================
// Order Store
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        orders
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn statistics(&self) -> OrderStatistics {
        let orders = self.orders.read().await;
        let mut stats = OrderStatistics::default();
        for order in orders.values() {
            stats.record(order.status, 1, order.total_cents);
        }
        stats
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: &Order) -> Result<Order, StoreError> {
        self.orders
            .write()
            .await
            .insert(order.id.clone(), order.clone());
        Ok(order.clone())
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn find_line_items(&self, order_id: &str) -> Result<Vec<LineItem>, StoreError> {
        self.orders
            .read()
            .await
            .get(order_id)
            .map(|order| order.items.clone())
            .ok_or_else(|| StoreError::not_found("order", order_id))
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A fixed price list.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    products: HashMap<String, (String, Money)>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(
        mut self,
        product_id: impl Into<String>,
        name: impl Into<String>,
        price: Money,
    ) -> Self {
        self.products
            .insert(product_id.into(), (name.into(), price));
        self
    }

    pub fn product_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.products.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lookup(&self, product_id: &str) -> Result<&(String, Money), StoreError> {
        self.products
            .get(product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))
    }
}

#[async_trait]
impl ProductCatalog for StaticCatalog {
    async fn get_price(&self, product_id: &str) -> Result<Money, StoreError> {
        Ok(self.lookup(product_id)?.1)
    }

    async fn get_name(&self, product_id: &str) -> Result<String, StoreError> {
        Ok(self.lookup(product_id)?.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_core::{OrderStatus, PaymentMethod};

    #[tokio::test]
    async fn test_store_round_trip() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let order = Order {
            id: "o-1".into(),
            user_id: "u-1".into(),
            items: vec![LineItem {
                product_id: "MUG-01".into(),
                product_name: "Mug".into(),
                quantity: 1,
                unit_price_cents: 1250,
            }],
            total_cents: 1250,
            status: OrderStatus::Paid,
            shipping_address: "1 Main St".into(),
            billing_address: None,
            payment_method: PaymentMethod::CreditCard,
            settlement_id: Some("cc_1".into()),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: Some(now),
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        };

        store.save(&order).await.unwrap();
        assert_eq!(store.find_by_id("o-1").await.unwrap(), Some(order));
        assert_eq!(store.find_line_items("o-1").await.unwrap().len(), 1);
        assert!(store.find_line_items("o-2").await.unwrap_err().is_not_found());
        assert_eq!(store.statistics().await.revenue_cents, 1250);
    }

    #[tokio::test]
    async fn test_static_catalog() {
        let catalog = StaticCatalog::new().with_product("MUG-01", "Mug", Money::from_cents(1250));
        assert_eq!(catalog.get_price("MUG-01").await.unwrap().cents(), 1250);
        assert_eq!(catalog.get_name("MUG-01").await.unwrap(), "Mug");
        assert!(catalog.get_price("NOPE").await.is_err());
    }
}
