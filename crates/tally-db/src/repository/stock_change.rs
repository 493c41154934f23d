//! # Stock-Change Repository
//!
//! Durable copy of the in-process [`StockAuditTrail`].
//!
//! ## Flushing the Trail
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  StockAuditTrail (memory)          stock_changes (SQLite)              │
//! │  #1 #2 #3 #4 #5 #6 #7              id │ trail_sequence │ ...           │
//! │            ▲                       ───┼────────────────┼────            │
//! │            │ watermark = 3          1 │       1        │               │
//! │            │                        2 │       2        │               │
//! │   flush(): entries_since(3)         3 │       3        │               │
//! │            = #4..#7  ──────────►    4 │       4  ...   (one tx)        │
//! │   watermark = 7                                                         │
//! │   truncate_through(7): #1..#7 dropped from memory                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The watermark only advances after the transaction commits, so a failed
//! flush is retried in full by the next call. Committed entries are then
//! dropped from the trail, which keeps it bounded by the unflushed backlog.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::DbResult;
use tally_core::{StockAuditTrail, StockChange, StockChangeKind};

#[derive(Debug, FromRow)]
struct StockChangeRow {
    trail_sequence: i64,
    product_id: String,
    kind: StockChangeKind,
    old_quantity: i64,
    new_quantity: i64,
    delta: i64,
    reserved_before: i64,
    reserved_after: i64,
    reason: String,
    recorded_at: DateTime<Utc>,
}

impl From<StockChangeRow> for StockChange {
    fn from(row: StockChangeRow) -> Self {
        StockChange {
            sequence: row.trail_sequence,
            product_id: row.product_id,
            kind: row.kind,
            old_quantity: row.old_quantity,
            new_quantity: row.new_quantity,
            delta: row.delta,
            reserved_before: row.reserved_before,
            reserved_after: row.reserved_after,
            reason: row.reason,
            recorded_at: row.recorded_at,
        }
    }
}

/// Repository for the stock-change history table.
#[derive(Debug, Clone)]
pub struct StockChangeRepository {
    pool: SqlitePool,
}

impl StockChangeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockChangeRepository { pool }
    }

    /// Appends `changes` in one transaction.
    pub async fn append(&self, changes: &[StockChange]) -> DbResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for change in changes {
            sqlx::query(
                r#"
                INSERT INTO stock_changes (
                    trail_sequence, product_id, kind, old_quantity, new_quantity,
                    delta, reserved_before, reserved_after, reason, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(change.sequence)
            .bind(&change.product_id)
            .bind(change.kind)
            .bind(change.old_quantity)
            .bind(change.new_quantity)
            .bind(change.delta)
            .bind(change.reserved_before)
            .bind(change.reserved_after)
            .bind(&change.reason)
            .bind(change.recorded_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = changes.len(), "Appended stock changes");
        Ok(())
    }

    /// History of one product, oldest first.
    pub async fn history(&self, product_id: &str, limit: u32) -> DbResult<Vec<StockChange>> {
        let rows = sqlx::query_as::<_, StockChangeRow>(
            r#"
            SELECT trail_sequence, product_id, kind, old_quantity, new_quantity,
                   delta, reserved_before, reserved_after, reason, recorded_at
            FROM stock_changes
            WHERE product_id = ?1
            ORDER BY id
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StockChange::from).collect())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_changes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Audit Flusher
// =============================================================================

/// Copies new trail entries into `stock_changes`.
#[derive(Debug)]
pub struct AuditFlusher {
    trail: Arc<StockAuditTrail>,
    repo: StockChangeRepository,
    watermark: Mutex<i64>,
}

impl AuditFlusher {
    pub fn new(trail: Arc<StockAuditTrail>, repo: StockChangeRepository) -> Self {
        AuditFlusher {
            trail,
            repo,
            watermark: Mutex::new(0),
        }
    }

    /// Persists every entry recorded since the last successful flush.
    ///
    /// Returns how many entries were written. Concurrent calls serialize.
    pub async fn flush(&self) -> DbResult<usize> {
        let mut watermark = self.watermark.lock().await;

        let pending = self.trail.entries_since(*watermark);
        let Some(last) = pending.last().map(|c| c.sequence) else {
            return Ok(0);
        };

        if let Err(e) = self.repo.append(&pending).await {
            warn!(error = %e, pending = pending.len(), "Audit flush failed");
            return Err(e);
        }

        *watermark = last;
        let dropped = self.trail.truncate_through(last);
        debug!(watermark = last, dropped, "Audit trail flushed");
        Ok(pending.len())
    }

    /// Sequence number of the last persisted entry.
    pub async fn watermark(&self) -> i64 {
        *self.watermark.lock().await
    }
}
