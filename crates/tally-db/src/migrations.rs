//! # Schema Migrations
//!
//! The SQL files under `migrations/sqlite` are compiled into the binary and
//! applied in filename order. sqlx keeps its bookkeeping in
//! `_sqlx_migrations`, so a file that has run once is skipped afterwards.
//!
//! ```text
//!   migrations/sqlite/
//!     001_initial_schema.sql   products, product_stock, orders,
//!                              order_items, stock_changes
//! ```
//!
//! Applied files are frozen: schema changes go in a new, higher-numbered
//! file.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Embedded versus applied migration counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub known: usize,
    pub applied: usize,
}

impl MigrationStatus {
    pub fn pending(&self) -> usize {
        self.known.saturating_sub(self.applied)
    }
}

/// Brings the schema up to date.
pub async fn migrate(pool: &SqlitePool) -> DbResult<()> {
    let before = status(pool).await?;
    if before.pending() == 0 {
        debug!(applied = before.applied, "Schema up to date");
        return Ok(());
    }

    MIGRATOR.run(pool).await?;
    info!(count = before.pending(), "Applied schema migrations");
    Ok(())
}

/// Reads the bookkeeping table. A database never migrated reports zero
/// applied.
pub async fn status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied: i64 = if tracked > 0 {
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?
    } else {
        0
    };

    Ok(MigrationStatus {
        known: MIGRATOR.iter().count(),
        applied: applied as usize,
    })
}
