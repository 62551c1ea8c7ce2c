//! Chainable relational transaction with first-error-wins semantics.
//!
//! ```ignore
//! Transaction::begin(&pool)
//!     .await?
//!     .insert(&[user])
//!     .await
//!     .update(&[group])
//!     .await
//!     .commit()
//!     .await?;
//! ```
//!
//! Once any write fails, later writes are skipped and `commit` rolls back and
//! returns that first error. The transaction is owned by value, so every exit
//! path either commits, rolls back, or drops it; dropping an unfinished
//! transaction rolls it back (sqlx does this on drop) and logs a warning.
//! A transaction holds one pooled connection and must stay within one request.

use std::future::Future;

use sqlx::{SqliteConnection, SqlitePool};

use crate::errors::AppError;

/// A row type the transaction knows how to write.
pub trait Record: Send + Sync {
    /// Human-readable kind, for log lines.
    const KIND: &'static str;

    fn insert(
        &self,
        conn: &mut SqliteConnection,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    fn update(
        &self,
        conn: &mut SqliteConnection,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    fn delete(
        &self,
        conn: &mut SqliteConnection,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

#[derive(Clone, Copy)]
enum Op {
    Insert,
    Update,
    Delete,
}

/// See the module documentation.
pub struct Transaction {
    tx: Option<sqlx::Transaction<'static, sqlx::Sqlite>>,
    error: Option<sqlx::Error>,
}

impl Transaction {
    /// Begin a transaction on a pooled connection.
    pub async fn begin(pool: &SqlitePool) -> Result<Self, AppError> {
        let tx = pool.begin().await?;
        Ok(Self {
            tx: Some(tx),
            error: None,
        })
    }

    pub async fn insert<R: Record>(self, records: &[R]) -> Self {
        self.apply(Op::Insert, records).await
    }

    /// Updating a record that does not exist counts as a failure.
    pub async fn update<R: Record>(self, records: &[R]) -> Self {
        self.apply(Op::Update, records).await
    }

    /// Deleting a record that does not exist counts as a failure.
    pub async fn delete<R: Record>(self, records: &[R]) -> Self {
        self.apply(Op::Delete, records).await
    }

    /// Roll back if any write failed and return that error, otherwise commit.
    pub async fn commit(mut self) -> Result<(), AppError> {
        let Some(tx) = self.tx.take() else {
            return Err(AppError::Internal("Transaction already finished".to_string()));
        };

        if let Some(err) = self.error.take() {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!("Rollback failed: {}", rollback_err);
            }
            return Err(err.into());
        }

        tx.commit().await?;
        Ok(())
    }

    /// Discard every write made so far.
    pub async fn rollback(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn apply<R: Record>(mut self, op: Op, records: &[R]) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(tx) = self.tx.as_mut() else {
            return self;
        };

        for record in records {
            let result = match op {
                Op::Insert => record.insert(&mut **tx).await,
                Op::Update => record.update(&mut **tx).await,
                Op::Delete => record.delete(&mut **tx).await,
            };

            match result {
                Ok(0) if !matches!(op, Op::Insert) => {
                    tracing::debug!("{} not found during transaction", R::KIND);
                    self.error = Some(sqlx::Error::RowNotFound);
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!("Transactional write of {} failed: {}", R::KIND, err);
                    self.error = Some(err);
                    break;
                }
            }
        }

        self
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!("Transaction dropped without commit or rollback; rolling back");
        }
    }
}
