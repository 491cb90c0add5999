//! Request and response bodies.

use base64::{Engine, engine::general_purpose::STANDARD};
use bulkmail_common::{
    Attachment, AttachmentMetadata, AttemptId, BatchId, BatchResult, EmailComposition,
    SendAttempt, SendStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentPayload {
    pub filename: String,
    /// Base64 of the file bytes
    pub content: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

/// A batch as submitted over HTTP.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub delay_seconds: f64,
}

impl SendRequest {
    /// Decode attachments into a composition.
    ///
    /// # Errors
    ///
    /// If an attachment is not valid base64.
    pub fn into_composition(self) -> Result<EmailComposition, ApiError> {
        let attachments = self
            .attachments
            .into_iter()
            .map(|attachment| {
                let bytes = STANDARD.decode(attachment.content.trim()).map_err(|e| {
                    ApiError::BadRequest(format!(
                        "Attachment \"{}\" is not valid base64: {e}",
                        attachment.filename
                    ))
                })?;

                Ok::<_, ApiError>(Attachment::new(
                    attachment.filename,
                    attachment.content_type,
                    bytes,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EmailComposition {
            subject: self.subject,
            body: self.body,
            recipients: self.recipients,
            attachments,
            delay_seconds: self.delay_seconds,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: BatchResult,
}

impl From<BatchResult> for SendResponse {
    fn from(result: BatchResult) -> Self {
        Self {
            success: result.success(),
            result,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResponse {
    pub success: bool,
    pub batch_id: BatchId,
}

/// One history row as callers see it.
#[derive(Debug, Clone, Serialize)]
pub struct LogRow {
    pub id: AttemptId,
    pub batch_id: BatchId,
    pub recipient_email: String,
    pub subject: String,
    pub body_preview: String,
    pub status: SendStatus,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub provider_message_id: Option<String>,
    pub attachments: Vec<AttachmentMetadata>,
}

impl From<SendAttempt> for LogRow {
    fn from(attempt: SendAttempt) -> Self {
        Self {
            status: attempt.status(),
            sent_at: attempt.sent_at(),
            error_message: attempt.error_message().map(ToString::to_string),
            provider_message_id: attempt.provider_message_id().map(ToString::to_string),
            id: attempt.id,
            batch_id: attempt.batch_id,
            recipient_email: attempt.recipient,
            subject: attempt.subject,
            body_preview: attempt.body_preview,
            queued_at: attempt.queued_at,
            attachments: attempt.attachments,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestConnectionRequest {
    /// Key to try; the stored key is used when absent
    #[serde(default, alias = "resend_api_key")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseRecipientsRequest {
    pub content: String,
}
