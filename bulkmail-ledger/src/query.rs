//! Read paths over stored attempts: filtered history pages and totals.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use bulkmail_common::{SendAttempt, SendStatus};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

const fn default_page() -> usize {
    1
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// A history request.
///
/// Dates accept RFC 3339 timestamps or plain `YYYY-MM-DD` days; a plain
/// `date_to` covers the whole day.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default, deserialize_with = "status_filter")]
    pub status: Option<SendStatus>,
    #[serde(default, deserialize_with = "start_bound")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "end_bound")]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub search: Option<String>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            status: None,
            date_from: None,
            date_to: None,
            search: None,
        }
    }
}

impl LogQuery {
    /// Whether `attempt` passes every filter.
    #[must_use]
    pub fn matches(&self, attempt: &SendAttempt) -> bool {
        if self.status.is_some_and(|status| attempt.status() != status) {
            return false;
        }

        if self.date_from.is_some_and(|from| attempt.queued_at < from)
            || self.date_to.is_some_and(|to| attempt.queued_at > to)
        {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                attempt.recipient.to_lowercase().contains(&needle)
                    || attempt.subject.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }

    /// Filter, order newest first, and cut out the requested page.
    #[must_use]
    pub fn apply(&self, rows: impl IntoIterator<Item = SendAttempt>) -> Page<SendAttempt> {
        let mut rows: Vec<SendAttempt> = rows.into_iter().filter(|row| self.matches(row)).collect();
        rows.sort_by(|a, b| b.queued_at.cmp(&a.queued_at).then_with(|| b.id.cmp(&a.id)));

        let page = self.page.max(1);
        let page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        let total = rows.len();

        let data = rows
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Page {
            data,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        }
    }
}

fn status_filter<'de, D>(deserializer: D) -> Result<Option<SendStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(status) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    if status.is_empty() || status.eq_ignore_ascii_case("all") {
        return Ok(None);
    }

    status.parse().map(Some).map_err(serde::de::Error::custom)
}

fn parse_bound(value: &str, time: NaiveTime) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|day| day.and_time(time).and_utc())
        .map_err(|e| format!("Invalid date {value:?}: {e}"))
}

fn bound<'de, D>(deserializer: D, time: NaiveTime) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) if !value.trim().is_empty() => parse_bound(value.trim(), time)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

fn start_bound<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    bound(deserializer, NaiveTime::MIN)
}

fn end_bound<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    bound(deserializer, end_of_day)
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Totals over a user's attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailStats {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub queued: usize,
    /// `sent / (sent + failed)`; attempts still queued are ignored
    pub success_rate: f64,
    pub last_sent_at: Option<DateTime<Utc>>,
}

impl EmailStats {
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "Counts are far below 2^52"
    )]
    pub fn from_attempts<'a>(attempts: impl IntoIterator<Item = &'a SendAttempt>) -> Self {
        let mut stats = Self {
            total: 0,
            sent: 0,
            failed: 0,
            queued: 0,
            success_rate: 0.0,
            last_sent_at: None,
        };

        for attempt in attempts {
            stats.total += 1;
            match attempt.status() {
                SendStatus::Sent => {
                    stats.sent += 1;
                    stats.last_sent_at = stats.last_sent_at.max(attempt.sent_at());
                }
                SendStatus::Failed => stats.failed += 1,
                SendStatus::Queued => stats.queued += 1,
            }
        }

        let terminal = stats.sent + stats.failed;
        if terminal > 0 {
            stats.success_rate = stats.sent as f64 / terminal as f64;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_query_from_camel_case() {
        let query: LogQuery = serde_json::from_str(
            r#"{"page":2,"pageSize":5,"status":"FAILED","dateFrom":"2025-01-01","dateTo":"2025-01-31","search":"acme"}"#,
        )
        .expect("parse");

        assert_eq!(query.page, 2);
        assert_eq!(query.page_size, 5);
        assert_eq!(query.status, Some(SendStatus::Failed));
        assert_eq!(
            query.date_from.map(|d| d.to_rfc3339()),
            Some("2025-01-01T00:00:00+00:00".to_string())
        );
        assert_eq!(
            query.date_to.map(|d| d.to_rfc3339()),
            Some("2025-01-31T23:59:59.999+00:00".to_string())
        );
        assert_eq!(query.search.as_deref(), Some("acme"));
    }

    #[test]
    fn test_query_defaults_and_all_status() {
        let query: LogQuery = serde_json::from_str(r#"{"status":"ALL"}"#).expect("parse");

        assert_eq!(query, LogQuery::default());
        assert!(serde_json::from_str::<LogQuery>(r#"{"status":"BOUNCED"}"#).is_err());
        assert!(serde_json::from_str::<LogQuery>(r#"{"dateFrom":"yesterday"}"#).is_err());
    }

    #[test]
    fn test_empty_page() {
        let page = LogQuery::default().apply(Vec::new());

        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.data.is_empty());
    }

    #[test]
    fn test_empty_stats() {
        let stats = EmailStats::from_attempts(std::iter::empty());

        assert_eq!(stats.total, 0);
        assert!(stats.success_rate.abs() < f64::EPSILON);
        assert!(stats.last_sent_at.is_none());
    }
}
