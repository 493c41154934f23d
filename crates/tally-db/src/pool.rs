//! # Connection Pool
//!
//! Opens the SQLite pool behind every repository.
//!
//! ## Locations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  DbLocation::File(path)                DbLocation::Memory               │
//! │       │                                     │                           │
//! │       │ create_if_missing                   │ one connection, never     │
//! │       │ WAL + NORMAL sync                   │ reaped: a second one      │
//! │       │ busy_timeout                        │ would open an empty DB    │
//! │       ▼                                     ▼                           │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │  SqlitePool (foreign_keys = ON)                                  │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ├── migrate (unless disabled)                                     │
//! │       ▼                                                                 │
//! │  Database ──► products() / orders() / stock_changes()                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! File databases use WAL so order lookups never wait on a checkout that
//! is writing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Connection, SqlitePool};
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;
use crate::repository::stock_change::StockChangeRepository;

// =============================================================================
// Location
// =============================================================================

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    /// Private to a single connection and gone once the pool closes.
    Memory,
    /// A database file, created on first connect.
    File(PathBuf),
}

impl DbLocation {
    fn connect_options(&self, busy_timeout: Duration) -> SqliteConnectOptions {
        let options = match self {
            DbLocation::Memory => SqliteConnectOptions::new().in_memory(true),
            DbLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(busy_timeout),
        };
        options.foreign_keys(true)
    }
}

impl fmt::Display for DbLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbLocation::Memory => f.write_str(":memory:"),
            DbLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// How to open a [`Database`].
///
/// ```rust
/// use tally_db::DbConfig;
///
/// let config = DbConfig::new("/var/lib/tally/tally.db")
///     .max_connections(8)
///     .min_connections(2);
/// assert_eq!(config.max_connections, 8);
/// assert!(!config.is_in_memory());
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: DbLocation,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a query waits for a free connection.
    pub acquire_timeout: Duration,
    /// `None` keeps idle connections forever.
    pub idle_timeout: Option<Duration>,
    /// How long a writer waits on a locked file before failing.
    pub busy_timeout: Duration,
    pub migrate_on_open: bool,
}

impl DbConfig {
    /// A pooled file database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            location: DbLocation::File(path.into()),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_secs(5),
            migrate_on_open: true,
        }
    }

    /// A throwaway database for tests and dry runs.
    ///
    /// Pinned to one connection with no idle reaping.
    pub fn in_memory() -> Self {
        DbConfig {
            location: DbLocation::Memory,
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: None,
            busy_timeout: Duration::ZERO,
            migrate_on_open: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn migrate_on_open(mut self, migrate: bool) -> Self {
        self.migrate_on_open = migrate;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.location == DbLocation::Memory
    }

    /// The database file, if there is one.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            DbLocation::File(path) => Some(path),
            DbLocation::Memory => None,
        }
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        // Extra connections to an in-memory database would each start empty.
        let (min, max) = if self.is_in_memory() {
            (1, 1)
        } else {
            (self.min_connections.min(self.max_connections), self.max_connections)
        };

        SqlitePoolOptions::new()
            .max_connections(max)
            .min_connections(min)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared pool handle. Clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        if config.is_in_memory() && config.max_connections > 1 {
            warn!(
                requested = config.max_connections,
                "In-memory database limited to one connection"
            );
        }

        let pool = config
            .pool_options()
            .connect_with(config.location.connect_options(config.busy_timeout))
            .await
            .map_err(|e| DbError::ConnectionFailed(format!("{}: {e}", config.location)))?;

        info!(
            location = %config.location,
            max_connections = config.max_connections,
            "Database opened"
        );

        let db = Database { pool };
        if config.migrate_on_open {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Applies pending migrations. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::migrate(&self.pool).await
    }

    /// The raw pool, for queries no repository covers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round-trips a ping over one pooled connection.
    pub async fn health_check(&self) -> bool {
        match self.pool.acquire().await {
            Ok(mut conn) => conn.ping().await.is_ok(),
            Err(_) => false,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database closed");
    }

    // -------------------------------------------------------------------------
    // Repositories
    // -------------------------------------------------------------------------

    fn repository<R>(&self, open: impl FnOnce(SqlitePool) -> R) -> R {
        open(self.pool.clone())
    }

    pub fn products(&self) -> ProductRepository {
        self.repository(ProductRepository::new)
    }

    pub fn orders(&self) -> OrderRepository {
        self.repository(OrderRepository::new)
    }

    /// History table fed by [`AuditFlusher`](crate::AuditFlusher).
    pub fn stock_changes(&self) -> StockChangeRepository {
        self.repository(StockChangeRepository::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let status = migrations::status(db.pool()).await.unwrap();
        assert!(status.known > 0);
        assert_eq!(status.pending(), 0);
    }

    #[tokio::test]
    async fn test_migrations_can_be_deferred() {
        let db = Database::new(DbConfig::in_memory().migrate_on_open(false))
            .await
            .unwrap();
        let status = migrations::status(db.pool()).await.unwrap();
        assert_eq!(status.applied, 0);
        assert_eq!(status.pending(), status.known);

        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();
        assert_eq!(migrations::status(db.pool()).await.unwrap().pending(), 0);
    }

    #[tokio::test]
    async fn test_closed_database_fails_health_check() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }

    #[test]
    fn test_locations() {
        let file = DbConfig::new("/tmp/tally.db")
            .max_connections(10)
            .min_connections(2)
            .migrate_on_open(false);
        assert_eq!(file.max_connections, 10);
        assert!(!file.migrate_on_open);
        assert_eq!(file.path(), Some(Path::new("/tmp/tally.db")));
        assert_eq!(file.location.to_string(), "/tmp/tally.db");

        let memory = DbConfig::in_memory();
        assert!(memory.is_in_memory());
        assert_eq!(memory.path(), None);
        assert_eq!(memory.location.to_string(), ":memory:");
    }
}
