//! HTTPS client for the Resend `/emails` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use bulkmail_common::outgoing;
use bulkmail_vault::Credentials;
use serde::{Deserialize, Serialize};

use super::{OutboundAttachment, OutboundMessage, Transport, TransportOutcome};
use crate::error::TransportError;

fn default_endpoint() -> String {
    String::from("https://api.resend.com/emails")
}

const fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResendConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Upper bound on one provider call, connection included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachments: Option<&'a [OutboundAttachment]>,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResendTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl ResendTransport {
    /// # Errors
    ///
    /// If the HTTP client cannot be constructed (TLS backend failure).
    pub fn new(config: &ResendConfig) -> Result<Self, TransportError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bulkmail/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout,
        })
    }

    fn classify(&self, error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Connection(error.to_string())
        }
    }

    async fn try_send(
        &self,
        credentials: &Credentials,
        message: &OutboundMessage,
    ) -> Result<String, TransportError> {
        let request = SendRequest {
            from: &message.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
            text: message.text.as_deref(),
            attachments: (!message.attachments.is_empty()).then_some(&*message.attachments),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&credentials.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(&e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|error| error.message.or(error.name))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Failed to send email")
                        .to_string()
                });

            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str::<SendResponse>(&body)
            .map(|response| response.id)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Transport for ResendTransport {
    async fn send(&self, credentials: &Credentials, message: &OutboundMessage) -> TransportOutcome {
        outgoing!(level = DEBUG, "Sending to {} via {}", message.to, self.endpoint);

        match self.try_send(credentials, message).await {
            Ok(provider_id) => {
                outgoing!(level = DEBUG, "Provider accepted message: {provider_id}");
                TransportOutcome::Sent { provider_id }
            }
            Err(error) => {
                if error.is_temporary() {
                    outgoing!(level = WARN, "Provider call failed (temporary): {error}");
                } else {
                    outgoing!(level = INFO, "Provider rejected message: {error}");
                }

                TransportOutcome::Failed {
                    error: error.to_string(),
                }
            }
        }
    }
}
