//! Error types shared by the validator and the send-attempt state machine.

use thiserror::Error;

use crate::{attempt::SendStatus, id::AttemptId};

/// A composition was rejected before any send was attempted.
///
/// Carries every user-facing problem found, not only the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid composition: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

impl ValidationError {
    #[must_use]
    pub const fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }
}

/// A send attempt was asked to leave a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Send attempt {id} is already {status} and cannot become {requested}")]
pub struct TransitionError {
    pub id: AttemptId,
    pub status: SendStatus,
    pub requested: SendStatus,
}
