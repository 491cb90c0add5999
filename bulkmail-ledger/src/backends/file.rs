use std::{
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bulkmail_common::{AttemptId, BatchId, SendAttempt, UserId, internal};
use bulkmail_tracing::traced;
use serde::Deserialize;
use tokio::fs;

use crate::{
    LedgerError,
    error::{Result, SerializationError},
    store::LogStore,
};

const TMP_PREFIX: &str = ".tmp_";

/// One bincode file per attempt, named `{attempt_id}.bin`.
///
/// Every write goes to `.tmp_{attempt_id}.bin` first and is renamed into
/// place, so a crash never leaves a half-written row behind. Listing only
/// considers names that parse as ULIDs.
#[derive(Debug, Clone)]
pub struct FileLogStore {
    path: PathBuf,
}

impl Default for FileLogStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/bulkmail/ledger"),
        }
    }
}

impl<'de> Deserialize<'de> for FileLogStore {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileLogStoreHelper {
            path: PathBuf,
        }

        let helper = FileLogStoreHelper::deserialize(deserializer)?;
        Self::new(helper.path).map_err(serde::de::Error::custom)
    }
}

impl FileLogStore {
    /// # Errors
    ///
    /// If `path` is relative, contains `..`, or points into a system
    /// directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        Self::validate_path(&path)?;
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate_path(path: &Path) -> Result<()> {
        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(LedgerError::InvalidConfiguration(format!(
                "Ledger path cannot contain '..' components: {}",
                path.display()
            )));
        }

        if !path.is_absolute() {
            return Err(LedgerError::InvalidConfiguration(format!(
                "Ledger path must be absolute: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(LedgerError::InvalidConfiguration(format!(
                "Ledger path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Create the directory if needed and remove temporary files left by an
    /// interrupted write.
    ///
    /// # Errors
    ///
    /// If the directory cannot be created, or the path is not a directory.
    pub fn init(&self) -> Result<()> {
        internal!("Initialising ledger at {}", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(Error::new(
                ErrorKind::NotADirectory,
                format!("Expected {} to be a directory", self.path.display()),
            )
            .into());
        }

        self.cleanup_temporary_files()
    }

    fn cleanup_temporary_files(&self) -> Result<()> {
        let mut cleaned = 0;

        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} interrupted ledger writes"
            );
        }

        Ok(())
    }

    fn row_path(&self, id: &AttemptId) -> PathBuf {
        self.path.join(format!("{id}.bin"))
    }

    async fn write_row(&self, attempt: &SendAttempt) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(attempt, bincode::config::standard())
            .map_err(SerializationError::from)?;

        let temp_path = self.path.join(format!("{TMP_PREFIX}{}.bin", attempt.id));
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, self.row_path(&attempt.id)).await?;

        Ok(())
    }

    async fn read_row(&self, id: &AttemptId) -> Result<SendAttempt> {
        let bytes = match fs::read(self.row_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(LedgerError::NotFound(*id)),
            Err(e) => return Err(e.into()),
        };

        let (attempt, _): (SendAttempt, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(SerializationError::from)?;

        if attempt.id != *id {
            return Err(SerializationError::Corrupted(format!(
                "{id}.bin holds attempt {}",
                attempt.id
            ))
            .into());
        }

        Ok(attempt)
    }

    async fn list_ids(&self) -> Result<Vec<AttemptId>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if !filename.starts_with(TMP_PREFIX)
                && let Some(id) = AttemptId::from_filename(&filename)
            {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn scan(&self, keep: impl Fn(&SendAttempt) -> bool + Send) -> Result<Vec<SendAttempt>> {
        let mut attempts = Vec::new();

        for id in self.list_ids().await? {
            match self.read_row(&id).await {
                Ok(attempt) if keep(&attempt) => attempts.push(attempt),
                Ok(_) => {}
                // Removed outside the process
                Err(LedgerError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(attempts)
    }
}

#[async_trait]
impl LogStore for FileLogStore {
    #[traced(instrument(level = tracing::Level::DEBUG, skip(self, attempt), fields(id = %attempt.id)), timing(precision = "ms"))]
    async fn insert(&self, attempt: &SendAttempt) -> Result<()> {
        if fs::try_exists(self.row_path(&attempt.id)).await? {
            return Err(LedgerError::AlreadyExists(attempt.id));
        }

        self.write_row(attempt).await?;
        internal!(level = DEBUG, "Recorded attempt {}", attempt.id);
        Ok(())
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip(self, attempt), fields(id = %attempt.id)), timing(precision = "ms"))]
    async fn update(&self, attempt: &SendAttempt) -> Result<()> {
        let stored = self.read_row(&attempt.id).await?;
        if stored.is_terminal() {
            return Err(LedgerError::TerminalOverwrite(attempt.id));
        }

        self.write_row(attempt).await?;
        internal!(
            level = DEBUG,
            "Attempt {} is now {}",
            attempt.id,
            attempt.status()
        );
        Ok(())
    }

    async fn get(&self, id: &AttemptId) -> Result<SendAttempt> {
        self.read_row(id).await
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "ms"))]
    async fn attempts_for_user(&self, user_id: &UserId) -> Result<Vec<SendAttempt>> {
        self.scan(|attempt| &attempt.user_id == user_id).await
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "ms"))]
    async fn attempts_for_batch(&self, batch_id: BatchId) -> Result<Vec<SendAttempt>> {
        self.scan(|attempt| attempt.batch_id == batch_id).await
    }
}
