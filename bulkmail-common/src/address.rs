//! Recipient address checks, deduplication and CSV recipient parsing.

use std::{
    collections::HashSet,
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Longest permitted local part (before the `@`)
pub const MAX_LOCAL_PART_LEN: usize = 64;
/// Longest permitted domain (after the `@`)
pub const MAX_DOMAIN_LEN: usize = 255;

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("address pattern is valid")
});

/// Returns `true` if `email` (after trimming) is a plausible single address.
///
/// The check is deliberately shallow: one `@`, no whitespace, a dotted
/// domain, and the RFC 5321 length limits on both halves.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();

    if !ADDRESS.is_match(email) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    local.chars().count() <= MAX_LOCAL_PART_LEN
        && domain.chars().count() <= MAX_DOMAIN_LEN
        && domain.contains('.')
}

/// Case-insensitive comparison key for an address.
#[must_use]
pub fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Remove duplicate addresses, keeping the first occurrence of each.
///
/// Entries are trimmed; comparison ignores case. Applying `dedupe` to its own
/// output returns the same list.
#[must_use]
pub fn dedupe<S: AsRef<str>>(emails: &[S]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(emails.len());

    emails
        .iter()
        .map(|email| email.as_ref().trim())
        .filter(|email| seen.insert(normalize(email)))
        .map(str::to_string)
        .collect()
}

/// Outcome of splitting a pasted or uploaded recipient list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvRecipients {
    /// Valid, unique addresses in input order
    pub valid: Vec<String>,
    /// Entries that are not addresses
    pub invalid: Vec<String>,
    /// Valid entries dropped because an earlier entry matched ignoring case
    pub duplicates: Vec<String>,
}

/// Parse CSV-like text into recipients.
///
/// Lines are split on `,`, `;` or tab; blank cells are ignored. Duplicate
/// detection is case-insensitive, and each distinct duplicate spelling is
/// reported once.
#[must_use]
pub fn parse_csv_emails(content: &str) -> CsvRecipients {
    let cells = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| line.split([',', ';', '\t']))
        .map(str::trim)
        .filter(|cell| !cell.is_empty());

    let mut result = CsvRecipients::default();
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();

    for cell in cells {
        if !is_valid_email(cell) {
            result.invalid.push(cell.to_string());
        } else if seen.insert(normalize(cell)) {
            result.valid.push(cell.to_string());
        } else if reported.insert(cell.to_string()) {
            result.duplicates.push(cell.to_string());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("  first.last+tag@mail.example.org  "));

        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@.co"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("a@@b.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn test_local_part_limit() {
        let at_limit = format!("{}@b.co", "a".repeat(64));
        let over_limit = format!("{}@b.co", "a".repeat(65));

        assert!(is_valid_email(&at_limit));
        assert!(!is_valid_email(&over_limit));
    }

    #[test]
    fn test_domain_limit() {
        let domain = format!("{}.com", "d".repeat(252));
        assert_eq!(domain.len(), 256);
        assert!(!is_valid_email(&format!("a@{domain}")));

        let domain = format!("{}.com", "d".repeat(251));
        assert!(is_valid_email(&format!("a@{domain}")));
    }

    #[test]
    fn test_dedupe_is_case_insensitive_and_stable() {
        let emails = ["B@x.com", "a@x.com", " b@X.com ", "A@X.COM", "c@x.com"];
        assert_eq!(dedupe(&emails), vec!["B@x.com", "a@x.com", "c@x.com"]);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let emails = vec![
            " One@Example.com",
            "one@example.com ",
            "two@example.com",
            "TWO@EXAMPLE.COM",
            "three@example.com",
        ];

        let once = dedupe(&emails);
        let twice = dedupe(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_parse_csv_emails() {
        let parsed = parse_csv_emails("a@b.com,bad\nA@B.COM");

        assert_eq!(parsed.valid, vec!["a@b.com"]);
        assert_eq!(parsed.invalid, vec!["bad"]);
        assert_eq!(parsed.duplicates, vec!["A@B.COM"]);
    }

    #[test]
    fn test_parse_csv_separators_and_blank_lines() {
        let parsed = parse_csv_emails(
            "one@x.com; two@x.com\r\n\r\n\tthree@x.com\tone@x.com\n,,\nONE@x.com\n",
        );

        assert_eq!(parsed.valid, vec!["one@x.com", "two@x.com", "three@x.com"]);
        assert!(parsed.invalid.is_empty());
        assert_eq!(parsed.duplicates, vec!["one@x.com", "ONE@x.com"]);
    }
}
