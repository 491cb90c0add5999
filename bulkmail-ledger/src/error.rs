//! Error types for the send-attempt log.

use std::io;

use bulkmail_common::AttemptId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Send attempt not found: {0}")]
    NotFound(AttemptId),

    #[error("Send attempt already exists: {0}")]
    AlreadyExists(AttemptId),

    /// The stored row is terminal and may not be rewritten.
    #[error("Send attempt {0} is already terminal")]
    TerminalOverwrite(AttemptId),

    #[error("Log capacity exceeded: {used}/{capacity} attempts")]
    CapacityExceeded { used: usize, capacity: usize },

    #[error("Invalid ledger configuration: {0}")]
    InvalidConfiguration(String),

    /// Lock poisoning and other unexpected states.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Whether retrying the same write could succeed.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Internal(_))
    }
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The file decoded to a row whose id does not match its filename.
    #[error("Corrupted attempt data: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
