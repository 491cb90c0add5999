//! Error types for dispatch.
//!
//! Only [`DispatchError`] ever reaches a caller of the dispatcher, and only
//! before the first recipient is attempted. Per-recipient transport failures
//! become `FAILED` rows, and log write failures become
//! [`bulkmail_common::PersistenceFailure`] entries on the batch result.

use std::time::Duration;

use bulkmail_common::{BatchId, TransitionError, ValidationError};
use bulkmail_ledger::LedgerError;
use bulkmail_vault::CredentialError;
use thiserror::Error;

/// Why a batch was rejected before dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("Batch not found: {0}")]
    NotFound(BatchId),

    #[error("Could not read batch history: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    /// The batch task ended without a result; its rows still record how far
    /// it got.
    #[error("Batch {0} stopped before reporting its result")]
    Interrupted(BatchId),
}

impl DispatchError {
    /// Errors the caller can fix by changing the request or their settings.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        match self {
            Self::Validation(_) | Self::NotFound(_) => true,
            Self::Credentials(e) => e.is_user_error(),
            Self::Ledger(_) | Self::ShuttingDown | Self::Interrupted(_) => false,
        }
    }
}

/// A single provider call that did not produce a message id.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Could not reach provider: {0}")]
    Connection(String),

    /// The provider answered with an error status.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("Could not build HTTP client: {0}")]
    Client(String),
}

impl TransportError {
    /// Rate limiting, server-side errors and network problems.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::Client(_) => false,
        }
    }
}

/// Recording a terminal outcome failed.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_displays_provider_message() {
        let err = TransportError::Rejected {
            status: 422,
            message: "Invalid `to` field".to_string(),
        };

        assert_eq!(err.to_string(), "Invalid `to` field");
        assert!(!err.is_temporary());
    }

    #[test]
    fn test_temporary_classification() {
        assert!(TransportError::Timeout(Duration::from_secs(30)).is_temporary());
        assert!(
            TransportError::Rejected {
                status: 429,
                message: "Too many requests".to_string()
            }
            .is_temporary()
        );
        assert!(
            TransportError::Rejected {
                status: 503,
                message: "Unavailable".to_string()
            }
            .is_temporary()
        );
        assert!(!TransportError::InvalidResponse("missing id".to_string()).is_temporary());
    }

    #[test]
    fn test_validation_is_user_error() {
        let err = DispatchError::from(ValidationError::new(vec!["Subject is required".to_string()]));
        assert!(err.is_user_error());
        assert!(!DispatchError::ShuttingDown.is_user_error());
    }
}
