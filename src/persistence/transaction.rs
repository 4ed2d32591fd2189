//! Transaction management over the persistence unit's pool.

use super::error::{DataAccessError, DataAccessResult};
use super::PersistenceUnit;
use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, warn};

/// Demarcates transactions for work done through a [`PersistenceUnit`].
///
/// Work passed to [`in_transaction`](Self::in_transaction) commits when it
/// returns `Ok` and rolls back when it returns `Err`.
///
/// ```rust,no_run
/// # use webapp_core::persistence::{DataAccessError, TransactionCoordinator};
/// # async fn example(transactions: &TransactionCoordinator) -> Result<(), DataAccessError> {
/// let id: i64 = transactions
///     .in_transaction(|conn| {
///         Box::pin(async move {
///             let id = sqlx::query_scalar("INSERT INTO accounts (email) VALUES ($1) RETURNING id")
///                 .bind("ada@example.com")
///                 .fetch_one(&mut *conn)
///                 .await?;
///             Ok::<_, DataAccessError>(id)
///         })
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    pool: PgPool,
}

impl TransactionCoordinator {
    /// Bind to the pool of an existing persistence unit
    pub fn new(unit: &PersistenceUnit) -> Self {
        Self {
            pool: unit.pool().clone(),
        }
    }

    /// Start a transaction the caller commits or rolls back. Dropping it
    /// without committing rolls it back.
    pub async fn begin(&self) -> DataAccessResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Run `work` inside a transaction
    pub async fn in_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<DataAccessError> + Send,
    {
        let mut tx = self.begin().await?;

        match work(&mut *tx).await {
            Ok(value) => {
                tx.commit().await.map_err(DataAccessError::from)?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(error = %rollback_error, "Transaction rollback failed");
                } else {
                    debug!("Transaction rolled back");
                }
                Err(e)
            }
        }
    }
}
