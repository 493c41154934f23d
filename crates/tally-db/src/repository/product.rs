//! # Product Repository
//!
//! Catalog rows and persisted stock records.
//!
//! ## Ledger Round Trip
//! ```text
//! ┌──────────────────┐  load_stock()    ┌──────────────────┐
//! │  product_stock   │─────────────────►│ InventoryLedger  │
//! │  (SQLite)        │  hydrate_ledger  │  (in memory)     │
//! │                  │◄─────────────────│                  │
//! └──────────────────┘  save_snapshots  └──────────────────┘
//! ```
//!
//! The ledger is authoritative while the process runs; the table is its
//! checkpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{InventoryLedger, Money, ProductCatalog, ProductStock, StoreError};

// =============================================================================
// Row Types
// =============================================================================

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CatalogProduct {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogProduct {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price_cents: i64) -> Self {
        let now = Utc::now();
        CatalogProduct {
            id: id.into(),
            name: name.into(),
            price_cents,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

#[derive(Debug, FromRow)]
struct StockRow {
    product_id: String,
    available: i64,
    reserved: i64,
    reorder_threshold: i64,
    total_stocked: i64,
    total_confirmed: i64,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for ProductStock {
    fn from(row: StockRow) -> Self {
        ProductStock {
            product_id: row.product_id,
            available: row.available,
            reserved: row.reserved,
            reorder_threshold: row.reorder_threshold,
            total_stocked: row.total_stocked,
            total_confirmed: row.total_confirmed,
            updated_at: row.updated_at,
        }
    }
}

const STOCK_COLUMNS: &str = "product_id, available, reserved, reorder_threshold, \
                             total_stocked, total_confirmed, updated_at";

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog and stock operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    /// Inserts a catalog entry.
    ///
    /// ## Errors
    /// - `UniqueViolation` if the id already exists
    pub async fn insert(&self, product: &CatalogProduct) -> DbResult<()> {
        debug!(id = %product.id, price_cents = product.price_cents, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &product.id),
            other => other,
        })?;

        Ok(())
    }

    /// Gets an active or inactive product by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CatalogProduct>> {
        let product = sqlx::query_as::<_, CatalogProduct>(
            r#"
            SELECT id, name, price_cents, is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product that is still for sale.
    async fn get_active(&self, id: &str) -> DbResult<CatalogProduct> {
        match self.get_by_id(id).await? {
            Some(product) if product.is_active => Ok(product),
            _ => Err(DbError::not_found("Product", id)),
        }
    }

    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<CatalogProduct>> {
        let products = sqlx::query_as::<_, CatalogProduct>(
            r#"
            SELECT id, name, price_cents, is_active, created_at, updated_at
            FROM products
            WHERE is_active = 1
            ORDER BY id
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    pub async fn update_price(&self, id: &str, price_cents: i64) -> DbResult<()> {
        debug!(id = %id, price_cents, "Updating price");

        let result = sqlx::query(
            "UPDATE products SET price_cents = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(price_cents)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    /// Takes a product off sale. Its stock record stays.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deactivating product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Stock Records
    // -------------------------------------------------------------------------

    /// Inserts or replaces the stock record of one product.
    pub async fn save_stock(&self, stock: &ProductStock) -> DbResult<()> {
        debug!(
            product_id = %stock.product_id,
            available = stock.available,
            reserved = stock.reserved,
            "Saving stock record"
        );

        upsert_stock(&self.pool, stock).await
    }

    /// Saves every snapshot in one transaction.
    pub async fn save_snapshots(&self, snapshots: &[ProductStock]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for stock in snapshots {
            upsert_stock(&mut *tx, stock).await?;
        }
        tx.commit().await?;

        debug!(count = snapshots.len(), "Saved stock snapshots");
        Ok(())
    }

    pub async fn get_stock(&self, product_id: &str) -> DbResult<Option<ProductStock>> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM product_stock WHERE product_id = ?1"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProductStock::from))
    }

    pub async fn load_stock(&self) -> DbResult<Vec<ProductStock>> {
        let rows = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM product_stock ORDER BY product_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProductStock::from).collect())
    }

    /// Records at or below their reorder threshold, lowest stock first.
    pub async fn low_stock(&self, limit: u32) -> DbResult<Vec<ProductStock>> {
        let rows = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM product_stock \
             WHERE available <= reorder_threshold \
             ORDER BY available, product_id \
             LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProductStock::from).collect())
    }

    /// Loads every persisted stock record into `ledger`.
    ///
    /// Reserved units in a checkpoint belong to checkouts that died with the
    /// previous process; they are returned to available before loading.
    pub async fn hydrate_ledger(&self, ledger: &InventoryLedger) -> DbResult<usize> {
        let records = self.load_stock().await?;
        let count = records.len();

        for mut stock in records {
            if stock.reserved > 0 {
                debug!(
                    product_id = %stock.product_id,
                    reserved = stock.reserved,
                    "Returning orphaned reservation to available"
                );
                stock.available += stock.reserved;
                stock.reserved = 0;
            }

            ledger.hydrate(stock).map_err(|e| DbError::CorruptRow {
                table: "product_stock",
                reason: e.to_string(),
            })?;
        }

        debug!(count, "Hydrated ledger from stock records");
        Ok(count)
    }
}

async fn upsert_stock<'e, E>(executor: E, stock: &ProductStock) -> DbResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO product_stock (
            product_id, available, reserved, reorder_threshold,
            total_stocked, total_confirmed, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (product_id) DO UPDATE SET
            available = excluded.available,
            reserved = excluded.reserved,
            reorder_threshold = excluded.reorder_threshold,
            total_stocked = excluded.total_stocked,
            total_confirmed = excluded.total_confirmed,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&stock.product_id)
    .bind(stock.available)
    .bind(stock.reserved)
    .bind(stock.reorder_threshold)
    .bind(stock.total_stocked)
    .bind(stock.total_confirmed)
    .bind(stock.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

// =============================================================================
// ProductCatalog Port
// =============================================================================

#[async_trait]
impl ProductCatalog for ProductRepository {
    async fn get_price(&self, product_id: &str) -> Result<Money, StoreError> {
        Ok(self.get_active(product_id).await?.price())
    }

    async fn get_name(&self, product_id: &str) -> Result<String, StoreError> {
        Ok(self.get_active(product_id).await?.name)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
