//! Credential handling: the at-rest API key cipher, per-user sender settings
//! and the [`CredentialResolver`] the dispatcher consumes.

pub mod cipher;
pub mod credentials;
pub mod error;
pub mod settings;

use std::path::PathBuf;

use serde::Deserialize;

pub use cipher::Vault;
pub use credentials::{CredentialResolver, Credentials};
pub use error::{CredentialError, CryptoError, SettingsError};
pub use settings::{SeedUser, SettingsStore, SettingsSummary, SettingsUpdate, UserSettings};

fn default_secret_env() -> String {
    String::from("ENCRYPTION_SECRET")
}

/// Where the process secret comes from, and where settings updates are
/// kept. Without `settings_path`, updates last until the process exits and
/// the `users` section is the only lasting source.
///
/// ```ron
/// vault: (
///     secret_env: "ENCRYPTION_SECRET",
///     settings_path: Some("/var/lib/bulkmail/settings.json"),
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Environment variable holding the secret (at least 32 characters)
    #[serde(default = "default_secret_env")]
    pub secret_env: String,

    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            settings_path: None,
        }
    }
}

impl VaultConfig {
    /// # Errors
    ///
    /// If the variable is unset or too short.
    pub fn open(&self) -> Result<Vault, CryptoError> {
        Vault::from_env(&self.secret_env)
    }
}
