//! Retrying SQLite transactions.

use rusqlite::{Connection, Transaction};

use crate::db::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, err: &DbError) -> bool {
        !matches!(err, DbError::NonRetryable(_))
    }
}

/// Mark an error so `transact_with_retries` gives up on the first failure.
pub fn non_retryable(err: impl Into<DbError>) -> DbError {
    DbError::NonRetryable(Box::new(err.into()))
}

/// Run `f` inside a transaction, committing on success.
///
/// Each failed attempt is rolled back before the next one starts, so writes
/// from a failed attempt are never visible. Failing to begin a transaction is
/// returned as-is without retrying. When every attempt fails, all attempt
/// errors are returned together in `DbError::Exhausted`.
pub fn transact_with_retries<T, F>(
    conn: &mut Connection,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, DbError>
where
    F: FnMut(&Transaction<'_>) -> Result<T, DbError>,
{
    let mut errors = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let tx = conn.transaction().map_err(|e| {
            log::error!("[transact_with_retries] Could not start transaction: {}", e);
            DbError::Sqlite(e)
        })?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                if attempt > 1 {
                    log::info!(
                        "[transact_with_retries] Committed on attempt {}",
                        attempt
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if let Err(e) = tx.rollback() {
                    log::error!("[transact_with_retries] Rollback failed: {}", e);
                }
                log::warn!(
                    "[transact_with_retries] Attempt {}/{} failed: {}",
                    attempt,
                    policy.max_attempts,
                    err
                );
                let retry = attempt < policy.max_attempts && policy.is_retryable(&err);
                errors.push(err);
                if !retry {
                    return Err(DbError::Exhausted(errors));
                }
            }
        }
    }
}
