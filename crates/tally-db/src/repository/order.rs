//! # Order Repository
//!
//! Durable store for the order aggregate.
//!
//! ## Save Semantics
//! ```text
//! save(order)
//!   BEGIN
//!     INSERT INTO orders ... ON CONFLICT(id) DO UPDATE   (header)
//!     DELETE FROM order_items WHERE order_id = ?         (lines)
//!     INSERT INTO order_items ... × n
//!   COMMIT
//! ```
//!
//! Line items never change after placement, so rewriting them on every
//! status update is cheap and keeps `save` a single idempotent call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{
    LineItem, Order, OrderStatistics, OrderStatus, OrderStore, PaymentMethod, StoreError,
};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    total_cents: i64,
    status: OrderStatus,
    shipping_address: String,
    billing_address: Option<String>,
    payment_method: PaymentMethod,
    settlement_id: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, items: Vec<LineItem>) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            items,
            total_cents: self.total_cents,
            status: self.status,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            payment_method: self.payment_method,
            settlement_id: self.settlement_id,
            cancellation_reason: self.cancellation_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            paid_at: self.paid_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LineItemRow {
    product_id: String,
    product_name: String,
    quantity: i64,
    unit_price_cents: i64,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        LineItem {
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
        }
    }
}

#[derive(Debug, FromRow)]
struct StatusTotalsRow {
    status: OrderStatus,
    order_count: i64,
    total_cents: i64,
}

const ORDER_COLUMNS: &str = "id, user_id, total_cents, status, shipping_address, billing_address, \
                             payment_method, settlement_id, cancellation_reason, created_at, \
                             updated_at, paid_at, shipped_at, delivered_at, cancelled_at";

// =============================================================================
// Filters
// =============================================================================

/// Criteria for [`OrderRepository::list`].
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<String>,
    pub limit: u32,
}

impl Default for OrderFilter {
    fn default() -> Self {
        OrderFilter {
            status: None,
            user_id: None,
            limit: 100,
        }
    }
}

impl OrderFilter {
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for orders and their line items.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Inserts or replaces an order and its line items in one transaction.
    pub async fn upsert(&self, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, status = %order.status, items = order.items.len(), "Saving order");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, total_cents, status, shipping_address, billing_address,
                payment_method, settlement_id, cancellation_reason, created_at,
                updated_at, paid_at, shipped_at, delivered_at, cancelled_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15
            )
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                settlement_id = excluded.settlement_id,
                cancellation_reason = excluded.cancellation_reason,
                updated_at = excluded.updated_at,
                paid_at = excluded.paid_at,
                shipped_at = excluded.shipped_at,
                delivered_at = excluded.delivered_at,
                cancelled_at = excluded.cancelled_at
            "#,
        )
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(order.total_cents)
        .bind(order.status)
        .bind(&order.shipping_address)
        .bind(&order.billing_address)
        .bind(order.payment_method)
        .bind(&order.settlement_id)
        .bind(&order.cancellation_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = ?1")
            .bind(&order.id)
            .execute(&mut *tx)
            .await?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, line_no, product_id, product_name, quantity, unit_price_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&order.id)
            .bind(line_no as i64)
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets an order with its line items.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.get_items(id).await?;
                Ok(Some(row.into_order(items)))
            }
            None => Ok(None),
        }
    }

    /// Line items of an order in placement order.
    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<LineItem>> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r#"
            SELECT product_id, product_name, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LineItem::from).collect())
    }

    /// Orders matching `filter`, newest first.
    pub async fn list(&self, filter: &OrderFilter) -> DbResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE (?1 IS NULL OR status = ?1) \
               AND (?2 IS NULL OR user_id = ?2) \
             ORDER BY created_at DESC, id \
             LIMIT ?3"
        ))
        .bind(filter.status)
        .bind(&filter.user_id)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.get_items(&row.id).await?;
            orders.push(row.into_order(items));
        }
        Ok(orders)
    }

    /// Counts per status and collected revenue.
    pub async fn statistics(&self) -> DbResult<OrderStatistics> {
        let rows = sqlx::query_as::<_, StatusTotalsRow>(
            r#"
            SELECT status,
                   COUNT(*) AS order_count,
                   COALESCE(SUM(total_cents), 0) AS total_cents
            FROM orders
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = OrderStatistics::default();
        for row in rows {
            stats.record(row.status, row.order_count, row.total_cents);
        }
        Ok(stats)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// OrderStore Port
// =============================================================================

#[async_trait]
impl OrderStore for OrderRepository {
    async fn save(&self, order: &Order) -> Result<Order, StoreError> {
        self.upsert(order).await?;
        Ok(order.clone())
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.get_by_id(order_id).await?)
    }

    async fn find_line_items(&self, order_id: &str) -> Result<Vec<LineItem>, StoreError> {
        if self.get_by_id(order_id).await?.is_none() {
            return Err(DbError::not_found("Order", order_id).into());
        }
        Ok(self.get_items(order_id).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
