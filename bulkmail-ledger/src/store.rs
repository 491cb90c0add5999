use std::fmt::Debug;

use async_trait::async_trait;
use bulkmail_common::{AttemptId, BatchId, SendAttempt, UserId};

use crate::{
    error::Result,
    query::{EmailStats, LogQuery, Page},
};

/// Durable storage for send-attempt rows.
///
/// Rows are independent: implementations must accept concurrent writes to
/// different rows without coordination. No row is ever deleted, and a row
/// that is terminal is never replaced.
#[async_trait]
pub trait LogStore: Send + Sync + Debug {
    /// Append a new row.
    ///
    /// # Errors
    ///
    /// [`crate::LedgerError::AlreadyExists`] if the id is taken, or any I/O
    /// failure.
    async fn insert(&self, attempt: &SendAttempt) -> Result<()>;

    /// Replace a non-terminal row with `attempt`.
    ///
    /// # Errors
    ///
    /// [`crate::LedgerError::NotFound`] for an unknown id,
    /// [`crate::LedgerError::TerminalOverwrite`] if the stored row is already
    /// `SENT` or `FAILED`.
    async fn update(&self, attempt: &SendAttempt) -> Result<()>;

    /// # Errors
    ///
    /// [`crate::LedgerError::NotFound`] for an unknown id.
    async fn get(&self, id: &AttemptId) -> Result<SendAttempt>;

    /// Every row belonging to `user_id`, in creation order.
    ///
    /// # Errors
    ///
    /// If the backing storage cannot be read.
    async fn attempts_for_user(&self, user_id: &UserId) -> Result<Vec<SendAttempt>>;

    /// Every row of one batch, in creation order.
    ///
    /// # Errors
    ///
    /// If the backing storage cannot be read.
    async fn attempts_for_batch(&self, batch_id: BatchId) -> Result<Vec<SendAttempt>>;

    /// # Errors
    ///
    /// If the backing storage cannot be read.
    async fn query(&self, user_id: &UserId, query: &LogQuery) -> Result<Page<SendAttempt>> {
        Ok(query.apply(self.attempts_for_user(user_id).await?))
    }

    /// # Errors
    ///
    /// If the backing storage cannot be read.
    async fn stats(&self, user_id: &UserId) -> Result<EmailStats> {
        Ok(EmailStats::from_attempts(
            &self.attempts_for_user(user_id).await?,
        ))
    }
}
