use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{id::BatchId, id::UserId};

/// A file attached to a composition.
///
/// The bytes live only for the duration of a dispatch; the log keeps
/// [`AttachmentMetadata`].
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Arc<[u8]>,
}

impl Attachment {
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    #[must_use]
    pub fn metadata(&self) -> AttachmentMetadata {
        AttachmentMetadata {
            name: self.filename.clone(),
            size: self.size(),
            content_type: self.content_type.clone(),
        }
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.content.len())
            .finish()
    }
}

/// What the log remembers about an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
}

/// A message as submitted by a caller, before validation.
#[derive(Debug, Clone, Default)]
pub struct EmailComposition {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    pub attachments: Vec<Attachment>,
    /// Pause between consecutive sends, in seconds
    pub delay_seconds: f64,
}

/// A validated, immutable composition ready for dispatch.
///
/// Produced only by [`crate::Validator::prepare`]; recipients are already
/// trimmed and deduplicated.
#[derive(Debug, Clone)]
pub struct Batch {
    pub(crate) id: BatchId,
    pub(crate) user_id: UserId,
    pub(crate) subject: Arc<str>,
    pub(crate) body: Arc<str>,
    pub(crate) recipients: Arc<[String]>,
    pub(crate) attachments: Arc<[Attachment]>,
    pub(crate) delay: Duration,
}

impl Batch {
    #[must_use]
    pub const fn id(&self) -> BatchId {
        self.id
    }

    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    #[must_use]
    pub fn attachment_metadata(&self) -> Vec<AttachmentMetadata> {
        self.attachments.iter().map(Attachment::metadata).collect()
    }

    /// Throttle delay between consecutive provider calls
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}
