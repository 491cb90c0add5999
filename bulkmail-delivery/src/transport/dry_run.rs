use async_trait::async_trait;
use bulkmail_common::outgoing;
use bulkmail_vault::Credentials;

use super::{OutboundMessage, Transport, TransportOutcome};

/// Accepts every message without contacting a provider.
///
/// Provider ids are `dry-run-{ulid}` so rows written during development are
/// easy to tell apart from real deliveries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunTransport;

#[async_trait]
impl Transport for DryRunTransport {
    async fn send(&self, credentials: &Credentials, message: &OutboundMessage) -> TransportOutcome {
        let provider_id = format!("dry-run-{}", ulid::Ulid::new());

        outgoing!(
            level = INFO,
            "[dry run] {} -> {}: {:?} ({} attachments) as {provider_id}",
            credentials.sender_email,
            message.to,
            message.subject,
            message.attachments.len()
        );

        TransportOutcome::Sent { provider_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_always_sends() {
        let credentials = Credentials::new("re_key", "news@example.com", None);
        let outcome = DryRunTransport
            .send(&credentials, &OutboundMessage::connection_test())
            .await;

        let TransportOutcome::Sent { provider_id } = outcome else {
            panic!("dry run should never fail");
        };
        assert!(provider_id.starts_with("dry-run-"));
    }
}
