//! Per-user sender settings with the API key held encrypted.
//!
//! Settings live in memory. With [`SettingsStore::with_file`] every update
//! is also written to a JSON file, which is read back at startup and takes
//! precedence over users seeded from configuration.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use bulkmail_common::{UserId, internal, is_valid_email};
use bulkmail_tracing::traced;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::{
    cipher::Vault,
    credentials::{CredentialResolver, Credentials},
    error::{CredentialError, CryptoError, SettingsError},
};

/// Stored settings for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    /// `salt:iv:ciphertext:tag` as produced by [`Vault::encrypt`]
    #[serde(default)]
    pub encrypted_api_key: Option<String>,
}

/// A user entry in the configuration file.
///
/// ```ron
/// users: [
///     (
///         id: "alice",
///         sender_email: Some("news@example.com"),
///         sender_name: Some("Example News"),
///         encrypted_api_key: Some("9f...:1a...:c4...:e0..."),
///     ),
/// ]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub id: UserId,
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub encrypted_api_key: Option<String>,
}

/// A partial change to a user's settings. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, alias = "resend_api_key")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
}

/// What callers may see of a user's settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSummary {
    pub id: UserId,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub has_api_key: bool,
}

#[derive(Debug)]
struct SettingsFile {
    path: PathBuf,
    /// Serialises snapshot-and-write so an older snapshot never lands last
    write: tokio::sync::Mutex<()>,
}

impl SettingsFile {
    fn error(&self, reason: impl ToString) -> SettingsError {
        SettingsError::Persist {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    vault: Vault,
    users: Arc<DashMap<UserId, UserSettings>>,
    file: Option<Arc<SettingsFile>>,
}

impl SettingsStore {
    #[must_use]
    pub fn new(vault: Vault) -> Self {
        Self {
            vault,
            users: Arc::new(DashMap::new()),
            file: None,
        }
    }

    /// Keep settings in `path`: entries already in the file replace any
    /// seeded user of the same id, and every later update rewrites it.
    /// A missing file starts empty.
    ///
    /// # Errors
    ///
    /// If the file exists but cannot be read or parsed.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let file = SettingsFile {
            path: path.into(),
            write: tokio::sync::Mutex::new(()),
        };

        match std::fs::read(&file.path) {
            Ok(bytes) => {
                let stored: BTreeMap<UserId, UserSettings> =
                    serde_json::from_slice(&bytes).map_err(|e| file.error(e))?;
                internal!(
                    level = INFO,
                    "Loaded settings for {} user(s) from {}",
                    stored.len(),
                    file.path.display()
                );
                for (user_id, settings) in stored {
                    self.users.insert(user_id, settings);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(file.error(e)),
        }

        self.file = Some(Arc::new(file));
        Ok(self)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|file| file.path.as_path())
    }

    /// Load users from configuration, replacing any existing entry.
    #[must_use]
    pub fn with_users(self, users: impl IntoIterator<Item = SeedUser>) -> Self {
        for user in users {
            self.users.insert(
                user.id,
                UserSettings {
                    sender_email: user.sender_email,
                    sender_name: user.sender_name,
                    encrypted_api_key: user.encrypted_api_key,
                },
            );
        }

        self
    }

    #[must_use]
    pub const fn vault(&self) -> &Vault {
        &self.vault
    }

    #[must_use]
    pub fn summary(&self, user_id: &UserId) -> SettingsSummary {
        let settings = self
            .users
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        SettingsSummary {
            id: user_id.clone(),
            sender_email: settings.sender_email,
            sender_name: settings.sender_name,
            has_api_key: settings.encrypted_api_key.is_some(),
        }
    }

    /// Apply `update`, encrypting a new API key before it is stored.
    ///
    /// # Errors
    ///
    /// If the sender address is invalid, the key is blank, or encryption
    /// fails, nothing is stored. If the settings file cannot be written the
    /// change is kept in memory only and [`SettingsError::Persist`] is
    /// returned.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(user = %user_id)))]
    pub async fn update(
        &self,
        user_id: &UserId,
        update: SettingsUpdate,
    ) -> Result<SettingsSummary, SettingsError> {
        if let Some(email) = update.sender_email.as_deref()
            && !is_valid_email(email)
        {
            return Err(SettingsError::InvalidSender(email.to_string()));
        }

        let encrypted = match update.api_key {
            Some(key) if key.trim().is_empty() => return Err(SettingsError::EmptyApiKey),
            Some(key) => Some(self.encrypt_blocking(key.trim().to_string()).await?),
            None => None,
        };

        {
            let mut entry = self.users.entry(user_id.clone()).or_default();
            if let Some(email) = update.sender_email {
                entry.sender_email = Some(email.trim().to_string());
            }
            if let Some(name) = update.sender_name {
                let name = name.trim();
                entry.sender_name = (!name.is_empty()).then(|| name.to_string());
            }
            if encrypted.is_some() {
                entry.encrypted_api_key = encrypted;
            }
        }

        self.persist().await?;

        internal!(level = INFO, "Updated settings for {user_id}");
        Ok(self.summary(user_id))
    }

    /// Write every user's settings to the settings file, if there is one,
    /// through a temp file and rename.
    async fn persist(&self) -> Result<(), SettingsError> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        let _write = file.write.lock().await;

        let snapshot: BTreeMap<UserId, UserSettings> = self
            .users
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(|e| file.error(e))?;

        if let Some(parent) = file.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| file.error(e))?;
        }

        let temp = file.path.with_extension("json.tmp");
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| file.error(e))?;
        tokio::fs::rename(&temp, &file.path)
            .await
            .map_err(|e| file.error(e))?;

        Ok(())
    }

    /// The decrypted API key for `user_id`, if one is stored.
    ///
    /// # Errors
    ///
    /// If the stored key cannot be decrypted.
    pub async fn api_key(&self, user_id: &UserId) -> Result<Option<String>, CryptoError> {
        let stored = self
            .users
            .get(user_id)
            .and_then(|entry| entry.encrypted_api_key.clone());

        match stored {
            Some(stored) => self.decrypt_blocking(stored).await.map(Some),
            None => Ok(None),
        }
    }

    // PBKDF2 takes tens of milliseconds; keep it off the async workers.
    async fn encrypt_blocking(&self, plaintext: String) -> Result<String, CryptoError> {
        let vault = self.vault.clone();
        tokio::task::spawn_blocking(move || vault.encrypt(&plaintext))
            .await
            .map_err(|_| CryptoError::Encrypt)?
    }

    async fn decrypt_blocking(&self, stored: String) -> Result<String, CryptoError> {
        let vault = self.vault.clone();
        tokio::task::spawn_blocking(move || vault.decrypt(&stored))
            .await
            .map_err(|_| CryptoError::Authentication)?
    }
}

#[async_trait]
impl CredentialResolver for SettingsStore {
    async fn resolve(&self, user_id: &UserId) -> Result<Credentials, CredentialError> {
        let settings = self
            .users
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CredentialError::NotConfigured(format!("no settings for {user_id}")))?;

        let sender_email = settings
            .sender_email
            .ok_or_else(|| CredentialError::NotConfigured("sender email is not set".to_string()))?;

        let stored = settings
            .encrypted_api_key
            .ok_or_else(|| CredentialError::NotConfigured("API key is not set".to_string()))?;

        let api_key = self.decrypt_blocking(stored).await?;

        Ok(Credentials {
            api_key,
            sender_email,
            sender_name: settings.sender_name,
        })
    }
}
