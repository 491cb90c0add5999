use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bulkmail_vault::Credentials;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{OutboundMessage, Transport, TransportOutcome};

/// One recorded provider call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    pub attachments: Vec<String>,
    /// When the call arrived, on the tokio clock so paused-time tests can
    /// measure throttling
    pub at: tokio::time::Instant,
}

#[derive(Debug, Default)]
struct MockState {
    failures: HashMap<String, String>,
    reject_all: Option<String>,
    calls: Vec<MockCall>,
    cancel_after: Option<(usize, CancellationToken)>,
    latency: Option<Duration>,
}

/// Scripted transport that records every call.
///
/// Recipients succeed with `mock-{n}` provider ids unless a failure was
/// scripted for them.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call addressed to `recipient` with `error`.
    #[must_use]
    pub fn fail_for(self, recipient: &str, error: &str) -> Self {
        self.state
            .lock()
            .failures
            .insert(recipient.to_string(), error.to_string());
        self
    }

    /// Fail every call with `error`, as a provider rejecting the key would.
    #[must_use]
    pub fn reject_all(self, error: &str) -> Self {
        self.state.lock().reject_all = Some(error.to_string());
        self
    }

    /// Cancel `token` once `calls` provider calls have completed.
    #[must_use]
    pub fn cancel_after(self, calls: usize, token: CancellationToken) -> Self {
        self.state.lock().cancel_after = Some((calls, token));
        self
    }

    /// Take `latency` to answer each call, on the tokio clock.
    #[must_use]
    pub fn latency(self, latency: Duration) -> Self {
        self.state.lock().latency = Some(latency);
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, _credentials: &Credentials, message: &OutboundMessage) -> TransportOutcome {
        let (outcome, latency) = self.answer(message);

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        outcome
    }
}

impl MockTransport {
    fn answer(&self, message: &OutboundMessage) -> (TransportOutcome, Option<Duration>) {
        let mut state = self.state.lock();

        state.calls.push(MockCall {
            from: message.from.to_string(),
            to: message.to.clone(),
            subject: message.subject.to_string(),
            html: message.html.to_string(),
            text: message.text.as_deref().map(ToString::to_string),
            attachments: message
                .attachments
                .iter()
                .map(|attachment| attachment.filename.clone())
                .collect(),
            at: tokio::time::Instant::now(),
        });
        let count = state.calls.len();

        if let Some((after, token)) = &state.cancel_after
            && count >= *after
        {
            token.cancel();
        }

        let failure = state
            .reject_all
            .clone()
            .or_else(|| state.failures.get(&message.to).cloned());

        let outcome = match failure {
            Some(error) => TransportOutcome::Failed { error },
            None => TransportOutcome::Sent {
                provider_id: format!("mock-{count}"),
            },
        };

        (outcome, state.latency)
    }
}
