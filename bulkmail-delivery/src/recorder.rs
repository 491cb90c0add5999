//! Durable bookkeeping around each provider call.
//!
//! Every recipient gets exactly one row: [`OutcomeRecorder::open`] writes it
//! as `QUEUED` before the provider is called, and [`OutcomeRecorder::close`]
//! applies the single terminal transition afterwards.

use std::sync::Arc;

use bulkmail_common::{Batch, BatchId, BatchResult, SendAttempt, UserId, audit};
use bulkmail_ledger::{EmailStats, LedgerError, LogQuery, LogStore, Page};
use bulkmail_tracing::traced;

use crate::{clock::Clock, error::RecordError, transport::TransportOutcome};

#[derive(Debug, Clone)]
pub struct OutcomeRecorder {
    store: Arc<dyn LogStore>,
    clock: Arc<dyn Clock>,
}

impl OutcomeRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Write the `QUEUED` row for `recipient`.
    ///
    /// # Errors
    ///
    /// If the row could not be stored; the provider must not be called.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(batch = %batch.id())))]
    pub async fn open(&self, batch: &Batch, recipient: &str) -> Result<SendAttempt, LedgerError> {
        let attempt = SendAttempt::queued(batch, recipient, self.clock.now());
        self.store.insert(&attempt).await?;

        audit::log_attempt_queued(attempt.batch_id, attempt.id, &attempt.recipient);
        Ok(attempt)
    }

    /// Apply `outcome` to `attempt` and store the terminal row.
    ///
    /// # Errors
    ///
    /// If the attempt is already terminal or the update could not be stored.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(id = %attempt.id)))]
    pub async fn close(
        &self,
        mut attempt: SendAttempt,
        outcome: &TransportOutcome,
    ) -> Result<SendAttempt, RecordError> {
        match outcome {
            TransportOutcome::Sent { provider_id } => {
                attempt.mark_sent(provider_id.as_str(), self.clock.now())?;
            }
            TransportOutcome::Failed { error } => attempt.mark_failed(error.as_str())?,
        }

        self.store.update(&attempt).await?;

        match outcome {
            TransportOutcome::Sent { provider_id } => audit::log_attempt_sent(
                attempt.batch_id,
                attempt.id,
                &attempt.recipient,
                provider_id,
            ),
            TransportOutcome::Failed { error } => {
                audit::log_attempt_failed(attempt.batch_id, attempt.id, &attempt.recipient, error);
            }
        }

        Ok(attempt)
    }

    /// Close every row of `batch_id` still `QUEUED` as failed with `reason`,
    /// returning how many were closed.
    ///
    /// Used when a batch task is abandoned mid-recipient. Rows that became
    /// terminal in the meantime are left alone.
    ///
    /// # Errors
    ///
    /// If the rows cannot be read or an update fails.
    #[traced(instrument(level = tracing::Level::INFO, skip(self, reason)), timing(precision = "ms"))]
    pub async fn fail_queued(&self, batch_id: BatchId, reason: &str) -> Result<usize, LedgerError> {
        let mut closed = 0;

        for mut attempt in self.store.attempts_for_batch(batch_id).await? {
            if attempt.is_terminal() || attempt.mark_failed(reason).is_err() {
                continue;
            }

            match self.store.update(&attempt).await {
                Ok(()) => {
                    audit::log_attempt_failed(attempt.batch_id, attempt.id, &attempt.recipient, reason);
                    closed += 1;
                }
                Err(LedgerError::TerminalOverwrite(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(closed)
    }

    /// Rebuild a batch summary and its owner from the stored rows, or
    /// `None` when no row of `batch_id` exists.
    ///
    /// # Errors
    ///
    /// If the log cannot be read.
    pub async fn reconstruct(
        &self,
        batch_id: BatchId,
    ) -> Result<Option<(UserId, BatchResult)>, LedgerError> {
        let attempts = self.store.attempts_for_batch(batch_id).await?;

        Ok(attempts.first().map(|first| {
            (
                first.user_id.clone(),
                BatchResult::from_attempts(batch_id, &attempts),
            )
        }))
    }

    /// # Errors
    ///
    /// If the log cannot be read.
    pub async fn history(
        &self,
        user_id: &UserId,
        query: &LogQuery,
    ) -> Result<Page<SendAttempt>, LedgerError> {
        self.store.query(user_id, query).await
    }

    /// # Errors
    ///
    /// If the log cannot be read.
    pub async fn stats(&self, user_id: &UserId) -> Result<EmailStats, LedgerError> {
        self.store.stats(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use bulkmail_common::{EmailComposition, SendStatus, Validator};
    use bulkmail_ledger::MemoryLogStore;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::SystemClock;

    fn recorder() -> OutcomeRecorder {
        OutcomeRecorder::new(Arc::new(MemoryLogStore::default()), Arc::new(SystemClock))
    }

    fn batch(recipients: &[&str]) -> Batch {
        Validator::default()
            .prepare(
                UserId::new("alice"),
                EmailComposition {
                    subject: "Hello".to_string(),
                    body: "Body".to_string(),
                    recipients: recipients.iter().map(ToString::to_string).collect(),
                    ..Default::default()
                },
            )
            .expect("valid composition")
    }

    #[tokio::test]
    async fn test_open_then_close() {
        let recorder = recorder();
        let batch = batch(&["a@example.com", "b@example.com"]);

        let first = recorder.open(&batch, "a@example.com").await.expect("open");
        assert_eq!(first.status(), SendStatus::Queued);
        let first = recorder
            .close(
                first,
                &TransportOutcome::Sent {
                    provider_id: "re_1".to_string(),
                },
            )
            .await
            .expect("close");
        assert_eq!(first.provider_message_id(), Some("re_1"));
        assert!(first.sent_at().is_some());

        let second = recorder.open(&batch, "b@example.com").await.expect("open");
        recorder
            .close(
                second,
                &TransportOutcome::Failed {
                    error: "Invalid recipient".to_string(),
                },
            )
            .await
            .expect("close");

        let (owner, result) = recorder
            .reconstruct(batch.id())
            .await
            .expect("reconstruct")
            .expect("rows exist");
        assert_eq!(owner, UserId::new("alice"));
        assert_eq!(result.sent, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].error, "Invalid recipient");
    }

    #[tokio::test]
    async fn test_close_twice_is_rejected() {
        let recorder = recorder();
        let batch = batch(&["a@example.com"]);

        let attempt = recorder.open(&batch, "a@example.com").await.expect("open");
        let sent = recorder
            .close(
                attempt,
                &TransportOutcome::Sent {
                    provider_id: "re_1".to_string(),
                },
            )
            .await
            .expect("close");

        let again = recorder
            .close(
                sent,
                &TransportOutcome::Failed {
                    error: "late".to_string(),
                },
            )
            .await;
        assert!(matches!(again, Err(RecordError::Transition(_))));

        let stats = recorder.stats(&UserId::new("alice")).await.expect("stats");
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_fail_queued_closes_only_open_rows() {
        let recorder = recorder();
        let batch = batch(&["a@example.com", "b@example.com"]);

        let first = recorder.open(&batch, "a@example.com").await.expect("open");
        recorder
            .close(
                first,
                &TransportOutcome::Sent {
                    provider_id: "re_1".to_string(),
                },
            )
            .await
            .expect("close");
        recorder.open(&batch, "b@example.com").await.expect("open");

        let closed = recorder
            .fail_queued(batch.id(), "Interrupted by shutdown")
            .await
            .expect("fail queued");
        assert_eq!(closed, 1);

        let (_, result) = recorder
            .reconstruct(batch.id())
            .await
            .expect("reconstruct")
            .expect("rows exist");
        assert_eq!(result.sent, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].recipient, "b@example.com");
        assert_eq!(result.errors[0].error, "Interrupted by shutdown");

        let again = recorder
            .fail_queued(batch.id(), "Interrupted by shutdown")
            .await
            .expect("fail queued");
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_reconstruct_unknown_batch() {
        let missing = recorder()
            .reconstruct(BatchId::generate())
            .await
            .expect("reconstruct");
        assert!(missing.is_none());
    }
}
