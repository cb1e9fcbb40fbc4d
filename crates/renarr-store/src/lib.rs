//! SQLite-backed persistence for the renarr workflow core.
//!
//! Provides the checkpoint/state store, the step history ledger and
//! the segment / narration-candidate repositories. All mutations run
//! inside short IMMEDIATE transactions with bounded retry on lock-busy
//! conditions, matching the single-writer execution model.

pub mod candidates;
pub mod checkpoint;
pub mod error;
pub mod jobs;
pub mod migrations;
pub mod pool;
pub mod segments;
pub mod step_history;

use std::time::Duration;

use rusqlite::{Transaction, TransactionBehavior};
use tracing::debug;

pub use checkpoint::{Checkpoint, CheckpointUpdate};
pub use error::{StoreError, StoreResult};
pub use pool::{DbPool, PooledConnection};
pub use step_history::StepHistoryRecord;

/// How many times a write transaction is retried when the database
/// reports busy before the error is surfaced.
const BUSY_RETRY_ATTEMPTS: u32 = 5;
const BUSY_RETRY_BASE: Duration = Duration::from_millis(20);

/// Handle to the persistent store.
///
/// Cheap to clone; all clones share the same connection pool.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    /// Open (or create) a store at the given file path.
    pub fn open(db_path: &str) -> StoreResult<Self> {
        Ok(Self {
            pool: pool::init_pool(db_path)?,
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self {
            pool: pool::init_memory_pool()?,
        })
    }

    fn conn(&self) -> StoreResult<PooledConnection> {
        pool::get_conn(&self.pool)
    }

    /// Run a read-only operation on a pooled connection.
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self.conn()?;
        f(&conn)
    }

    /// Run a write inside a short IMMEDIATE transaction.
    ///
    /// IMMEDIATE takes the write lock up front, so a reader-to-writer
    /// lock upgrade can never fail mid-transaction. Busy errors are
    /// retried with exponential backoff a bounded number of times.
    pub(crate) fn write<T>(
        &self,
        mut f: impl FnMut(&Transaction) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.conn()?;

        for attempt in 0..BUSY_RETRY_ATTEMPTS {
            let result = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::Database)
                .and_then(|tx| {
                    let value = f(&tx)?;
                    tx.commit()?;
                    Ok(value)
                });

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_busy() && attempt + 1 < BUSY_RETRY_ATTEMPTS => {
                    let delay = BUSY_RETRY_BASE.saturating_mul(2u32.pow(attempt));
                    debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Database busy, retrying write transaction"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::Busy(BUSY_RETRY_ATTEMPTS))
    }
}
