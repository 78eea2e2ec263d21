//! SQLite database
//!
//! One file (or in-memory) database pooled with r2d2. Every store operation
//! checks out a connection, runs one statement and returns it.

use std::path::Path;
use std::time::Duration;

use log::debug;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::Result;

/// Type alias for the connection pool
type DbPool = Pool<SqliteConnectionManager>;

/// Pooled handle on the key, user and report tables
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Opens (creating if needed) the database file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder().max_size(8).build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        debug!("Opened database at {}", path.display());
        Ok(db)
    }

    /// In-memory database with the same schema.
    ///
    /// The pool holds a single connection since every in-memory connection
    /// is a separate database.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Checks out one connection
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS api_keys (
                key TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                hashed_password TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS analysis_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                overall_project_health TEXT NOT NULL,
                overall_summary TEXT NOT NULL,
                formatted_report TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analysis_results_timestamp
                ON analysis_results(timestamp);",
        )?;
        Ok(())
    }
}
