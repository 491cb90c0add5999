//! Composition checks run before anything is queued.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    address::{dedupe, is_valid_email},
    composition::{Attachment, Batch, EmailComposition},
    error::ValidationError,
    format,
    id::{BatchId, UserId},
};

const MIB: u64 = 1024 * 1024;

const fn default_max_subject_chars() -> usize {
    500
}

const fn default_max_body_chars() -> usize {
    100_000
}

const fn default_max_recipients() -> usize {
    100
}

const fn default_max_attachment_bytes() -> u64 {
    10 * MIB
}

const fn default_max_total_attachment_bytes() -> u64 {
    10 * MIB
}

const fn default_max_delay_seconds() -> u32 {
    3600
}

fn default_allowed_types() -> Vec<String> {
    [
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "image/jpeg",
        "image/png",
        "image/gif",
        "text/plain",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Limits applied by the [`Validator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationLimits {
    #[serde(default = "default_max_subject_chars")]
    pub max_subject_chars: usize,
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    #[serde(default = "default_max_recipients")]
    pub max_recipients: usize,
    /// Per-file ceiling in bytes
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
    /// Ceiling on the sum of all attachments in bytes
    #[serde(default = "default_max_total_attachment_bytes")]
    pub max_total_attachment_bytes: u64,
    /// Permitted attachment MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    /// Longest pause allowed between two sends
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: u32,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_subject_chars: default_max_subject_chars(),
            max_body_chars: default_max_body_chars(),
            max_recipients: default_max_recipients(),
            max_attachment_bytes: default_max_attachment_bytes(),
            max_total_attachment_bytes: default_max_total_attachment_bytes(),
            allowed_types: default_allowed_types(),
            max_delay_seconds: default_max_delay_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "Only used to render limits in messages"
)]
fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / MIB as f64
}

/// Pure checks over an [`EmailComposition`].
#[derive(Debug, Clone, Default)]
pub struct Validator {
    limits: ValidationLimits,
}

impl Validator {
    #[must_use]
    pub const fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub const fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Check every constraint on `composition`, collecting all problems.
    ///
    /// Duplicate recipients are not an error; the recipient limit applies
    /// after they are removed.
    #[must_use]
    pub fn validate(&self, composition: &EmailComposition) -> ValidationReport {
        let mut errors = Vec::new();
        let limits = &self.limits;

        if composition.subject.trim().is_empty() {
            errors.push("Subject is required".to_string());
        } else if composition.subject.chars().count() > limits.max_subject_chars {
            errors.push(format!(
                "Subject must be less than {} characters",
                limits.max_subject_chars
            ));
        }

        if composition.body.trim().is_empty() {
            errors.push("Email body is required".to_string());
        } else if composition.body.chars().count() > limits.max_body_chars {
            errors.push(format!(
                "Email body must be less than {} characters",
                group_thousands(limits.max_body_chars)
            ));
        }

        let recipients = dedupe(&composition.recipients);
        if recipients.is_empty() {
            errors.push("At least one recipient is required".to_string());
        } else if recipients.len() > limits.max_recipients {
            errors.push(format!(
                "Maximum {} recipients per batch",
                limits.max_recipients
            ));
        }

        let invalid: Vec<&str> = recipients
            .iter()
            .map(String::as_str)
            .filter(|email| !is_valid_email(email))
            .collect();
        if !invalid.is_empty() {
            errors.push(format!("Invalid email addresses: {}", invalid.join(", ")));
        }

        if let Err(error) = self.validate_attachments(&composition.attachments) {
            errors.push(error);
        }

        let delay = composition.delay_seconds;
        if !delay.is_finite() || delay < 0.0 {
            errors.push("Delay must be a non-negative number of seconds".to_string());
        } else if delay > f64::from(self.limits.max_delay_seconds) {
            errors.push(format!(
                "Delay must be at most {} seconds",
                self.limits.max_delay_seconds
            ));
        }

        ValidationReport::from_errors(errors)
    }

    /// Check attachments against the allow-list and size ceilings.
    ///
    /// Stops at the first offending file.
    ///
    /// # Errors
    ///
    /// A message naming the offending file, or the total size.
    pub fn validate_attachments(&self, attachments: &[Attachment]) -> Result<(), String> {
        let limits = &self.limits;
        let mut total = 0_u64;

        for attachment in attachments {
            if attachment.size() > limits.max_attachment_bytes {
                return Err(format!(
                    "File \"{}\" ({}) exceeds maximum size of {}MB",
                    attachment.filename,
                    format::file_size(attachment.size()),
                    megabytes(limits.max_attachment_bytes)
                ));
            }

            if !limits
                .allowed_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&attachment.content_type))
            {
                return Err(format!(
                    "File type \"{}\" is not allowed for \"{}\"",
                    attachment.content_type, attachment.filename
                ));
            }

            total = total.saturating_add(attachment.size());
        }

        if total > limits.max_total_attachment_bytes {
            return Err(format!(
                "Total attachment size ({:.2}MB) exceeds maximum of {}MB",
                megabytes(total),
                megabytes(limits.max_total_attachment_bytes)
            ));
        }

        Ok(())
    }

    /// Validate and freeze a composition into a [`Batch`].
    ///
    /// # Errors
    ///
    /// Every problem [`Validator::validate`] reports.
    pub fn prepare(
        &self,
        user_id: UserId,
        composition: EmailComposition,
    ) -> Result<Batch, ValidationError> {
        let report = self.validate(&composition);
        if !report.valid {
            return Err(ValidationError::new(report.errors));
        }

        let delay = Duration::try_from_secs_f64(composition.delay_seconds).map_err(|e| {
            ValidationError::new(vec![format!("Delay is out of range: {e}")])
        })?;

        Ok(Batch {
            id: BatchId::generate(),
            user_id,
            subject: Arc::from(composition.subject),
            body: Arc::from(composition.body),
            recipients: dedupe(&composition.recipients).into(),
            attachments: composition.attachments.into(),
            delay,
        })
    }
}

fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    grouped
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn composition(recipients: &[&str]) -> EmailComposition {
        EmailComposition {
            subject: "Quarterly update".to_string(),
            body: "Hello,\n\nNumbers are up.".to_string(),
            recipients: recipients.iter().map(ToString::to_string).collect(),
            attachments: Vec::new(),
            delay_seconds: 0.0,
        }
    }

    fn attachment(name: &str, content_type: &str, size: usize) -> Attachment {
        Attachment::new(name, content_type, vec![0_u8; size])
    }

    #[test]
    fn test_valid_composition() {
        let report = Validator::default().validate(&composition(&["a@b.co", "c@d.org"]));
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_errors_accumulate() {
        let mut input = composition(&["bad", "also bad@x.com"]);
        input.subject = "   ".to_string();
        input.body = String::new();

        let report = Validator::default().validate(&input);

        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec![
                "Subject is required",
                "Email body is required",
                "Invalid email addresses: bad, also bad@x.com",
            ]
        );
    }

    #[test]
    fn test_length_limits() {
        let mut input = composition(&["a@b.co"]);
        input.subject = "s".repeat(501);
        input.body = "b".repeat(100_001);

        let report = Validator::default().validate(&input);
        assert_eq!(
            report.errors,
            vec![
                "Subject must be less than 500 characters",
                "Email body must be less than 100,000 characters",
            ]
        );

        input.subject = "s".repeat(500);
        input.body = "b".repeat(100_000);
        assert!(Validator::default().validate(&input).valid);
    }

    #[test]
    fn test_recipient_count_after_dedupe() {
        let report = Validator::default().validate(&composition(&[]));
        assert_eq!(report.errors, vec!["At least one recipient is required"]);

        let many: Vec<String> = (0..101).map(|i| format!("user{i}@example.com")).collect();
        let mut input = composition(&[]);
        input.recipients = many;
        let report = Validator::default().validate(&input);
        assert_eq!(report.errors, vec!["Maximum 100 recipients per batch"]);

        let mut repeated: Vec<String> = (0..100).map(|i| format!("user{i}@example.com")).collect();
        repeated.push("USER0@example.com".to_string());
        input.recipients = repeated;
        assert!(Validator::default().validate(&input).valid);
    }

    #[test]
    fn test_attachment_type_and_size() {
        let validator = Validator::default();

        let ok = [attachment("report.pdf", "application/pdf", 1024)];
        assert!(validator.validate_attachments(&ok).is_ok());

        let bad_type = [
            attachment("run.exe", "application/x-msdownload", 10),
            attachment("huge.pdf", "application/pdf", 11 * 1024 * 1024),
        ];
        assert_eq!(
            validator.validate_attachments(&bad_type).unwrap_err(),
            "File type \"application/x-msdownload\" is not allowed for \"run.exe\""
        );

        let too_big = [attachment("huge.pdf", "application/pdf", 11 * 1024 * 1024)];
        assert_eq!(
            validator.validate_attachments(&too_big).unwrap_err(),
            "File \"huge.pdf\" (11 MB) exceeds maximum size of 10MB"
        );

        let total = [
            attachment("a.png", "image/png", 6 * 1024 * 1024),
            attachment("b.png", "image/png", 6 * 1024 * 1024),
        ];
        assert_eq!(
            validator.validate_attachments(&total).unwrap_err(),
            "Total attachment size (12.00MB) exceeds maximum of 10MB"
        );
    }

    #[test]
    fn test_negative_or_nan_delay() {
        let mut input = composition(&["a@b.co"]);
        input.delay_seconds = -1.0;
        assert!(!Validator::default().validate(&input).valid);

        input.delay_seconds = f64::NAN;
        assert!(!Validator::default().validate(&input).valid);
    }

    #[test]
    fn test_delay_above_limit_rejected_by_validate() {
        let mut input = composition(&["a@b.co"]);
        input.delay_seconds = 1e12;

        let report = Validator::default().validate(&input);
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Delay must be at most 3600 seconds"]);

        input.delay_seconds = 3600.0;
        assert!(Validator::default().validate(&input).valid);

        let strict = Validator::new(ValidationLimits {
            max_delay_seconds: 10,
            ..ValidationLimits::default()
        });
        input.delay_seconds = 10.5;
        assert!(!strict.validate(&input).valid);
        assert!(strict.prepare(UserId::new("u1"), input).is_err());
    }

    #[test]
    fn test_prepare_dedupes_and_freezes() {
        let mut input = composition(&[" a@b.co ", "A@B.CO", "c@d.org"]);
        input.delay_seconds = 1.5;

        let batch = Validator::default()
            .prepare(UserId::new("u1"), input)
            .expect("valid composition");

        assert_eq!(batch.recipients(), ["a@b.co", "c@d.org"]);
        assert_eq!(batch.delay(), Duration::from_millis(1500));
        assert_eq!(batch.user_id().as_str(), "u1");
    }

    #[test]
    fn test_prepare_rejects_with_all_errors() {
        let mut input = composition(&[]);
        input.subject = String::new();

        let err = Validator::default()
            .prepare(UserId::new("u1"), input)
            .unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(500), "500");
        assert_eq!(group_thousands(100_000), "100,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
