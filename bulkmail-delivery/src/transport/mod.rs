//! The uniform contract around one provider call.

pub mod dry_run;
pub mod mock;
pub mod resend;

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bulkmail_vault::Credentials;
use serde::Serialize;

pub use dry_run::DryRunTransport;
pub use mock::{MockCall, MockTransport};
pub use resend::{ResendConfig, ResendTransport};

/// Sink address reserved by the provider for connection tests
pub const TEST_SENDER: &str = "onboarding@resend.dev";
pub const TEST_RECIPIENT: &str = "delivered@resend.dev";
pub const TEST_SUBJECT: &str = "API Key Test";
pub const TEST_HTML: &str = "<p>Testing API key connection</p>";

/// An attachment ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundAttachment {
    pub filename: String,
    /// Base64 of the file bytes
    pub content: String,
}

/// One rendered message for one recipient.
///
/// The shared parts are reference counted so rendering a batch costs one
/// copy of the body and attachments, not one per recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: Arc<str>,
    pub to: String,
    pub subject: Arc<str>,
    pub html: Arc<str>,
    pub text: Option<Arc<str>>,
    pub attachments: Arc<[OutboundAttachment]>,
}

impl OutboundMessage {
    /// The fixed message used to check a set of credentials.
    #[must_use]
    pub fn connection_test() -> Self {
        Self {
            from: Arc::from(TEST_SENDER),
            to: TEST_RECIPIENT.to_string(),
            subject: Arc::from(TEST_SUBJECT),
            html: Arc::from(TEST_HTML),
            text: None,
            attachments: Arc::from([]),
        }
    }
}

/// Result of one provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransportOutcome {
    Sent { provider_id: String },
    Failed { error: String },
}

impl TransportOutcome {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Sends one message through the provider.
///
/// Implementations never return an error: every failure, including a
/// timeout, comes back as [`TransportOutcome::Failed`], and every call
/// completes in bounded time.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, credentials: &Credentials, message: &OutboundMessage) -> TransportOutcome;

    /// Check that `credentials` are accepted, using the provider's sink
    /// address instead of a real recipient.
    async fn test_connection(&self, credentials: &Credentials) -> TransportOutcome {
        self.send(credentials, &OutboundMessage::connection_test())
            .await
    }
}
