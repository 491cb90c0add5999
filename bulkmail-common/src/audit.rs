//! Structured audit events for the batch lifecycle.
//!
//! Every event carries an `event` field so log pipelines can pick them out:
//!
//! - `BatchSubmitted`: a composition passed validation
//! - `AttemptQueued`: the `QUEUED` row for a recipient was written
//! - `AttemptSent` / `AttemptFailed`: the provider answered
//! - `AttemptUnrecorded`: the provider was (or was not) called but the log
//!   write failed; emitted at ERROR since the log and the provider disagree
//! - `BatchCompleted`: totals once the batch finished or was cancelled
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::{
    attempt::{BatchResult, PersistenceFailure},
    id::{AttemptId, BatchId, UserId},
};

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Emit audit events at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Replace the local part of recipient addresses with `[REDACTED]`
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

static AUDIT_CONFIG: OnceLock<Arc<AuditConfig>> = OnceLock::new();

/// Set the process-wide audit configuration. Later calls are ignored.
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if !redact {
        return email.to_string();
    }

    email
        .split_once('@')
        .map_or_else(|| "[REDACTED]".to_string(), |(_, domain)| format!("[REDACTED]@{domain}"))
}

fn recipient(email: &str) -> Option<String> {
    let config = config();
    config
        .enabled
        .then(|| redact_email(email, config.redact_recipients))
}

pub fn log_batch_submitted(batch_id: BatchId, user_id: &UserId, recipients: usize, attachments: usize) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "BatchSubmitted",
        batch_id = %batch_id,
        user_id = %user_id,
        recipient_count = recipients,
        attachment_count = attachments,
        "Audit: Batch submitted"
    );
}

pub fn log_attempt_queued(batch_id: BatchId, attempt_id: AttemptId, email: &str) {
    let Some(email) = recipient(email) else {
        return;
    };

    tracing::event!(
        tracing::Level::DEBUG,
        event = "AttemptQueued",
        batch_id = %batch_id,
        attempt_id = %attempt_id,
        recipient = %email,
        "Audit: Attempt queued"
    );
}

pub fn log_attempt_sent(batch_id: BatchId, attempt_id: AttemptId, email: &str, provider_id: &str) {
    let Some(email) = recipient(email) else {
        return;
    };

    tracing::event!(
        tracing::Level::INFO,
        event = "AttemptSent",
        batch_id = %batch_id,
        attempt_id = %attempt_id,
        recipient = %email,
        provider_id = %provider_id,
        "Audit: Attempt sent"
    );
}

pub fn log_attempt_failed(batch_id: BatchId, attempt_id: AttemptId, email: &str, error: &str) {
    let Some(email) = recipient(email) else {
        return;
    };

    tracing::event!(
        tracing::Level::WARN,
        event = "AttemptFailed",
        batch_id = %batch_id,
        attempt_id = %attempt_id,
        recipient = %email,
        error = %error,
        "Audit: Attempt failed"
    );
}

/// Always emitted, even with auditing disabled: the durable log no longer
/// reflects what happened at the provider.
pub fn log_attempt_unrecorded(batch_id: BatchId, failure: &PersistenceFailure) {
    let config = config();
    let email = redact_email(&failure.recipient, config.redact_recipients);

    tracing::event!(
        tracing::Level::ERROR,
        event = "AttemptUnrecorded",
        batch_id = %batch_id,
        recipient = %email,
        stage = ?failure.stage,
        delivered = ?failure.delivered,
        error = %failure.error,
        "Audit: Send attempt could not be recorded"
    );
}

pub fn log_batch_completed(result: &BatchResult, duration_ms: u128) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "BatchCompleted",
        batch_id = %result.batch_id,
        sent = result.sent,
        failed = result.failed,
        total = result.total,
        unrecorded = result.persistence_errors.len(),
        cancelled = result.cancelled,
        skipped = result.skipped,
        duration_ms = duration_ms,
        "Audit: Batch completed"
    );
}
