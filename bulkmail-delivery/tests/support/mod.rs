#![allow(dead_code)] // Not every test file uses every helper

pub mod fake_provider;

use std::sync::Arc;

use async_trait::async_trait;
use bulkmail_common::{EmailComposition, UserId, Validator};
use bulkmail_delivery::{Dispatcher, Transport};
use bulkmail_ledger::LogStore;
use bulkmail_vault::{CredentialError, CredentialResolver, Credentials};

/// Resolves every user to the same credentials, or to none.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    credentials: Option<Credentials>,
}

impl StaticResolver {
    pub fn configured() -> Self {
        Self {
            credentials: Some(credentials()),
        }
    }

    pub const fn unconfigured() -> Self {
        Self { credentials: None }
    }
}

#[async_trait]
impl CredentialResolver for StaticResolver {
    async fn resolve(&self, user_id: &UserId) -> Result<Credentials, CredentialError> {
        self.credentials.clone().ok_or_else(|| {
            CredentialError::NotConfigured(format!("No API key configured for {user_id}"))
        })
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("re_test_key", "news@example.com", Some("Example News".to_string()))
}

pub fn alice() -> UserId {
    UserId::new("alice")
}

pub fn recipients(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("user{i}@example.com")).collect()
}

pub fn composition<S: AsRef<str>>(recipients: &[S], delay_seconds: f64) -> EmailComposition {
    EmailComposition {
        subject: "Product update".to_string(),
        body: "Hello,\n\nVersion 2 is out.".to_string(),
        recipients: recipients.iter().map(|r| r.as_ref().to_string()).collect(),
        attachments: Vec::new(),
        delay_seconds,
    }
}

pub fn dispatcher(
    resolver: StaticResolver,
    transport: impl Transport + 'static,
    store: Arc<dyn LogStore>,
) -> Dispatcher {
    Dispatcher::new(
        Validator::default(),
        Arc::new(resolver),
        Arc::new(transport),
        store,
    )
}
