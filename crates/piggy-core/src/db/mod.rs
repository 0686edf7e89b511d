//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `purchases` - item-level purchase records (the Purchase Store)
//! - `reports` - weekly alternative-suggestion reports (the Report Store)
//!
//! The underlying engine is SQLite; the purchase_items table is indexed by
//! `(user_id, ts)` so every engine query filters on that pair. All queries
//! are parameterised — user input never reaches query text directly.

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::Result;

mod purchases;
mod reports;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
///
/// Accepts both the `CURRENT_TIMESTAMP` format and RFC 3339.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool and run migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database for testing
    ///
    /// Uses a unique temporary file rather than `:memory:` so that every
    /// pooled connection sees the same data.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!("piggy_test_{}_{}.db", std::process::id(), id));
        let path = path.to_string_lossy().to_string();

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Quick connectivity probe for the health endpoint
    pub fn ping(&self) -> bool {
        self.conn()
            .and_then(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(Into::into)
            })
            .is_ok()
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block writers
            PRAGMA journal_mode = WAL;
            PRAGMA cache_size = 2000;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Query deadline under lock contention
            PRAGMA busy_timeout = 15000;

            -- Item-level purchase records (owned by ingestion)
            CREATE TABLE IF NOT EXISTS purchase_items (
                item_id TEXT PRIMARY KEY,
                purchase_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                merchant TEXT NOT NULL,
                item_name TEXT NOT NULL,
                category TEXT NOT NULL,
                subcategory TEXT,
                item_text TEXT NOT NULL,
                price REAL NOT NULL CHECK (price >= 0),
                qty REAL NOT NULL DEFAULT 1 CHECK (qty >= 0),
                ts TEXT NOT NULL,
                detected_needwant TEXT NOT NULL DEFAULT 'unset',
                user_needwant TEXT NOT NULL DEFAULT 'unset',
                confidence REAL NOT NULL DEFAULT 0,
                -- Coarse location only; lat/lon are dropped at ingestion
                loc_city TEXT,
                loc_state TEXT,
                loc_country TEXT,
                loc_postal_code TEXT,
                -- JSON-encoded embedding vector, consumed passively
                item_embed TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_purchase_items_user_ts
                ON purchase_items(user_id, ts);
            CREATE INDEX IF NOT EXISTS idx_purchase_items_purchase
                ON purchase_items(purchase_id);

            -- Weekly alternative-suggestion reports, one per (user, week)
            CREATE TABLE IF NOT EXISTS weekly_reports (
                report_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                week_start TEXT NOT NULL,
                week_end TEXT NOT NULL,
                loc_city TEXT,
                loc_state TEXT,
                loc_country TEXT,
                items_analyzed INTEGER NOT NULL DEFAULT 0,
                items_with_alternatives INTEGER NOT NULL DEFAULT 0,
                total_savings REAL NOT NULL DEFAULT 0,
                findings TEXT NOT NULL DEFAULT '[]',
                notes TEXT,
                mcp_calls_made INTEGER NOT NULL DEFAULT 0,
                processing_time_ms INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, week_start)
            );
            "#,
        )?;

        info!("Database migrations complete: {}", self.db_path);
        Ok(())
    }
}
