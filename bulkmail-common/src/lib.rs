//! Shared types for the bulkmail dispatch engine: recipient validation, the
//! composition and send-attempt model, identifiers, logging and audit events.

pub mod address;
pub mod attempt;
pub mod audit;
pub mod composition;
pub mod error;
pub mod format;
pub mod id;
pub mod logging;
pub mod validation;

pub use address::{CsvRecipients, dedupe, is_valid_email, parse_csv_emails};
pub use attempt::{
    BatchResult, PersistenceFailure, PersistenceStage, RecipientError, SendAttempt, SendStatus,
};
pub use composition::{Attachment, AttachmentMetadata, Batch, EmailComposition};
pub use error::{TransitionError, ValidationError};
pub use id::{AttemptId, BatchId, UserId};
pub use tracing;
pub use validation::{ValidationLimits, ValidationReport, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
