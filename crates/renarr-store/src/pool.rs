//! Database connection pool management.
//!
//! Connection pooling for SQLite using r2d2. Handles pool
//! initialization, per-connection pragmas and running migrations.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::{StoreError, StoreResult};
use crate::migrations;

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

fn init_pragmas(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    // WAL keeps readers unblocked while the single writer holds an
    // IMMEDIATE transaction; the busy timeout is the first line of
    // defense before the explicit busy-retry loop kicks in.
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 250;",
    )
}

/// Initialize a new database pool with the given file path.
///
/// Creates the SQLite file if missing, enables foreign keys and WAL on
/// every connection and runs pending migrations.
pub fn init_pool(db_path: &str) -> StoreResult<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(init_pragmas);

    let pool = Pool::builder().max_size(4).build(manager)?;

    let conn = pool.get()?;
    migrations::run_migrations(&conn)?;

    Ok(pool)
}

/// Initialize an in-memory database pool for testing.
///
/// The pool is capped at a single connection so every caller sees the
/// same in-memory database; it is lost when the pool is dropped.
pub fn init_memory_pool() -> StoreResult<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(init_pragmas);

    let pool = Pool::builder().max_size(1).build(manager)?;

    let conn = pool.get()?;
    migrations::run_migrations(&conn)?;

    Ok(pool)
}

/// Get a connection from the pool.
pub fn get_conn(pool: &DbPool) -> StoreResult<PooledConnection> {
    pool.get().map_err(StoreError::Pool)
}
