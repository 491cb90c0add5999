//! Human-readable formatting for log lines and user-facing messages.

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Format a byte count as e.g. `1.5 MB`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    reason = "Display only; two decimals are shown"
)]
pub fn file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/// Truncate to `max_chars` characters, appending `...` when shortened.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
