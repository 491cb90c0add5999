//! The per-recipient send attempt and the batch summary derived from it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    composition::{AttachmentMetadata, Batch},
    error::TransitionError,
    format,
    id::{AttemptId, BatchId, UserId},
};

/// Characters of the body kept on each attempt row
pub const BODY_PREVIEW_CHARS: usize = 100;

/// Lifecycle of a single send attempt.
///
/// `Queued` is the only initial state; `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Queued,
    Sent,
    Failed,
}

impl SendStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SendStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(Self::Queued),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("Unknown send status: {other}")),
        }
    }
}

/// The durable record of one recipient's dispatch outcome.
///
/// Fields that only make sense in one terminal state are private and only
/// set through [`SendAttempt::mark_sent`] and [`SendAttempt::mark_failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAttempt {
    pub id: AttemptId,
    pub batch_id: BatchId,
    pub user_id: UserId,
    pub recipient: String,
    pub subject: String,
    pub body_preview: String,
    pub queued_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentMetadata>,
    status: SendStatus,
    sent_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    provider_message_id: Option<String>,
}

impl SendAttempt {
    /// A fresh `Queued` attempt for `recipient` in `batch`.
    #[must_use]
    pub fn queued(batch: &Batch, recipient: &str, queued_at: DateTime<Utc>) -> Self {
        Self {
            id: AttemptId::generate(),
            batch_id: batch.id(),
            user_id: batch.user_id().clone(),
            recipient: recipient.to_string(),
            subject: batch.subject().to_string(),
            body_preview: format::truncate(batch.body(), BODY_PREVIEW_CHARS),
            queued_at,
            attachments: batch.attachment_metadata(),
            status: SendStatus::Queued,
            sent_at: None,
            error_message: None,
            provider_message_id: None,
        }
    }

    #[must_use]
    pub const fn status(&self) -> SendStatus {
        self.status
    }

    #[must_use]
    pub const fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    #[must_use]
    pub fn provider_message_id(&self) -> Option<&str> {
        self.provider_message_id.as_deref()
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition `Queued -> Sent`.
    ///
    /// # Errors
    ///
    /// If the attempt is already terminal.
    pub fn mark_sent(
        &mut self,
        provider_message_id: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_queued(SendStatus::Sent)?;

        self.status = SendStatus::Sent;
        self.sent_at = Some(sent_at);
        self.provider_message_id = Some(provider_message_id.into());
        Ok(())
    }

    /// Transition `Queued -> Failed`.
    ///
    /// # Errors
    ///
    /// If the attempt is already terminal.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_queued(SendStatus::Failed)?;

        self.status = SendStatus::Failed;
        self.error_message = Some(error.into());
        Ok(())
    }

    const fn ensure_queued(&self, requested: SendStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                id: self.id,
                status: self.status,
                requested,
            });
        }

        Ok(())
    }
}

/// One recipient that could not be sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientError {
    pub recipient: String,
    pub error: String,
}

/// Where recording an attempt went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceStage {
    /// The `Queued` row could not be written; the provider was not called
    Queue,
    /// The terminal update could not be written; the outcome is unrecorded
    Finalize,
}

/// A log write failure, reported apart from ordinary send failures because
/// the provider outcome and the durable log may disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceFailure {
    pub recipient: String,
    pub stage: PersistenceStage,
    /// Outcome at the provider, when it was reached
    pub delivered: Option<bool>,
    pub error: String,
}

/// Summary of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub sent: usize,
    pub failed: usize,
    /// Recipients that reached a terminal outcome
    pub total: usize,
    pub errors: Vec<RecipientError>,
    pub persistence_errors: Vec<PersistenceFailure>,
    pub cancelled: bool,
    /// Recipients never processed because the batch was cancelled
    pub skipped: usize,
}

impl BatchResult {
    #[must_use]
    pub const fn new(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            sent: 0,
            failed: 0,
            total: 0,
            errors: Vec::new(),
            persistence_errors: Vec::new(),
            cancelled: false,
            skipped: 0,
        }
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
        self.total += 1;
    }

    pub fn record_failed(&mut self, recipient: &str, error: impl Into<String>) {
        self.failed += 1;
        self.total += 1;
        self.errors.push(RecipientError {
            recipient: recipient.to_string(),
            error: error.into(),
        });
    }

    pub fn record_persistence_failure(&mut self, failure: PersistenceFailure) {
        self.persistence_errors.push(failure);
    }

    /// `true` when nothing failed and everything was recorded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.failed == 0 && self.persistence_errors.is_empty() && !self.cancelled
    }

    /// Rebuild a summary from the stored rows of one batch.
    ///
    /// Rows still `Queued` belong to a batch in flight (or one interrupted by
    /// a crash) and are counted as neither sent nor failed.
    #[must_use]
    pub fn from_attempts<'a>(
        batch_id: BatchId,
        attempts: impl IntoIterator<Item = &'a SendAttempt>,
    ) -> Self {
        let mut result = Self::new(batch_id);

        for attempt in attempts {
            match attempt.status() {
                SendStatus::Sent => result.record_sent(),
                SendStatus::Failed => result.record_failed(
                    &attempt.recipient,
                    attempt.error_message().unwrap_or_default(),
                ),
                SendStatus::Queued => {}
            }
        }

        result
    }
}
