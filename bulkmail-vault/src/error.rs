use thiserror::Error;

/// Failures of the at-rest credential cipher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The process secret is missing or too short.
    #[error("Encryption secret must be at least {minimum} characters (got {actual})")]
    WeakSecret { minimum: usize, actual: usize },

    /// The named environment variable holding the secret is not set.
    #[error("Encryption secret variable {0} is not set")]
    MissingSecret(String),

    /// The stored value is not `salt:iv:ciphertext:tag` in hex with the
    /// expected field lengths.
    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    /// Tag verification failed: wrong secret or tampered ciphertext.
    #[error("Authentication failed: ciphertext was tampered with or the secret is wrong")]
    Authentication,

    /// Decryption succeeded but did not yield UTF-8.
    #[error("Decrypted value is not valid UTF-8")]
    InvalidUtf8,

    #[error("Encryption failed")]
    Encrypt,
}

/// Why credentials could not be supplied for a user.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The user has no API key or sender address configured.
    #[error("Credentials not configured: {0}")]
    NotConfigured(String),

    /// The stored API key could not be decrypted.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The settings backend itself failed.
    #[error("Credential backend error: {0}")]
    Backend(String),
}

impl CredentialError {
    /// Errors the user can fix by updating their settings.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }
}

/// Problems with a settings update.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid sender email address: {0}")]
    InvalidSender(String),

    #[error("API key must not be empty")]
    EmptyApiKey,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The settings file could not be read or written.
    #[error("Settings file {path}: {reason}")]
    Persist { path: String, reason: String },
}

impl SettingsError {
    /// Errors the caller can fix by changing the update.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidSender(_) | Self::EmptyApiKey)
    }
}
