use std::sync::Arc;

use serde::Deserialize;

use crate::{
    backends::{FileLogStore, MemoryLogStore},
    error::Result,
    store::LogStore,
};

/// Selects the log store at startup.
///
/// ```ron
/// ledger: (
///     type: "File",
///     path: "/var/lib/bulkmail/ledger",
/// ),
/// ```
///
/// or, for development:
///
/// ```ron
/// ledger: (
///     type: "Memory",
///     capacity: Some(10000),
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerConfig {
    File(FileLogStore),
    Memory(MemoryConfig),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of rows kept (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::File(FileLogStore::default())
    }
}

impl LedgerConfig {
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(store) => Some(store.path()),
            Self::Memory(_) => None,
        }
    }

    /// Build the configured store, creating the ledger directory if needed.
    ///
    /// # Errors
    ///
    /// If a file ledger cannot be initialised.
    pub fn into_store(self) -> Result<Arc<dyn LogStore>> {
        match self {
            Self::File(store) => {
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory(config) => Ok(config.capacity.map_or_else(
                || Arc::new(MemoryLogStore::new()) as Arc<dyn LogStore>,
                |capacity| Arc::new(MemoryLogStore::with_capacity(capacity)),
            )),
        }
    }
}
