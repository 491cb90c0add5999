use std::fmt;

use async_trait::async_trait;
use bulkmail_common::UserId;

use crate::error::CredentialError;

/// Decrypted provider credentials and the verified sender identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        sender_email: impl Into<String>,
        sender_name: Option<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            sender_email: sender_email.into(),
            sender_name,
        }
    }

    /// The `From` header value, `Name <address>` when a name is set.
    #[must_use]
    pub fn from_address(&self) -> String {
        match self.sender_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{name} <{}>", self.sender_email),
            _ => self.sender_email.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("sender_email", &self.sender_email)
            .field("sender_name", &self.sender_name)
            .finish()
    }
}

/// Supplies credentials for a user's dispatch.
///
/// Called once per batch, before any attempt is queued.
#[async_trait]
pub trait CredentialResolver: Send + Sync + fmt::Debug {
    /// # Errors
    ///
    /// [`CredentialError::NotConfigured`] when the user has no usable key or
    /// sender, [`CredentialError::Crypto`] when the stored key cannot be
    /// decrypted.
    async fn resolve(&self, user_id: &UserId) -> Result<Credentials, CredentialError>;
}
