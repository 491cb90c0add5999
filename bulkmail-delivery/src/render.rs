//! Turning a batch into provider messages.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use bulkmail_common::Batch;
use bulkmail_vault::Credentials;

use crate::transport::{OutboundAttachment, OutboundMessage};

/// Wrap each line of `body` in a paragraph; blank lines become `<p><br></p>`.
///
/// Text is inserted as-is, so markup typed into the body is kept.
#[must_use]
pub fn text_to_html(body: &str) -> String {
    body.replace('\r', "")
        .split('\n')
        .map(|line| {
            if line.is_empty() {
                String::from("<p><br></p>")
            } else {
                format!("<p>{line}</p>")
            }
        })
        .collect()
}

/// The parts of a message shared by every recipient of one batch.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    from: Arc<str>,
    subject: Arc<str>,
    html: Arc<str>,
    text: Arc<str>,
    attachments: Arc<[OutboundAttachment]>,
}

impl MessageTemplate {
    /// Render `batch` once; attachments are base64 encoded here and shared.
    #[must_use]
    pub fn new(batch: &Batch, credentials: &Credentials) -> Self {
        Self {
            from: Arc::from(credentials.from_address()),
            subject: Arc::from(batch.subject()),
            html: Arc::from(text_to_html(batch.body())),
            text: Arc::from(batch.body()),
            attachments: batch
                .attachments()
                .iter()
                .map(|attachment| OutboundAttachment {
                    filename: attachment.filename.clone(),
                    content: STANDARD.encode(&attachment.content),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn for_recipient(&self, recipient: &str) -> OutboundMessage {
        OutboundMessage {
            from: Arc::clone(&self.from),
            to: recipient.to_string(),
            subject: Arc::clone(&self.subject),
            html: Arc::clone(&self.html),
            text: Some(Arc::clone(&self.text)),
            attachments: Arc::clone(&self.attachments),
        }
    }
}

#[cfg(test)]
mod tests {
    use bulkmail_common::{Attachment, EmailComposition, UserId, Validator};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_text_to_html() {
        assert_eq!(text_to_html("Hello"), "<p>Hello</p>");
        assert_eq!(
            text_to_html("Hi team,\r\n\r\nShip it."),
            "<p>Hi team,</p><p><br></p><p>Ship it.</p>"
        );
        assert_eq!(text_to_html(""), "<p><br></p>");
    }

    #[test]
    fn test_template_shares_rendered_parts() {
        let batch = Validator::default()
            .prepare(
                UserId::new("alice"),
                EmailComposition {
                    subject: "Report".to_string(),
                    body: "See attached.".to_string(),
                    recipients: vec!["a@example.com".to_string(), "b@example.com".to_string()],
                    attachments: vec![Attachment::new(
                        "report.pdf",
                        "application/pdf",
                        b"hello".to_vec(),
                    )],
                    ..Default::default()
                },
            )
            .expect("valid composition");
        let credentials =
            Credentials::new("re_key", "news@example.com", Some("Example News".to_string()));

        let template = MessageTemplate::new(&batch, &credentials);
        let first = template.for_recipient("a@example.com");
        let second = template.for_recipient("b@example.com");

        assert_eq!(&*first.from, "Example News <news@example.com>");
        assert_eq!(first.html.as_ref(), "<p>See attached.</p>");
        assert_eq!(first.text.as_deref(), Some("See attached."));
        assert_eq!(first.attachments[0].content, "aGVsbG8=");
        assert_eq!(second.to, "b@example.com");
        assert!(Arc::ptr_eq(&first.attachments, &second.attachments));
    }
}
