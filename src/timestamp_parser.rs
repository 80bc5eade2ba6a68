use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Parses the reset instants reported by the usage endpoints
pub struct TimestampParser;

impl TimestampParser {
    /// Parse an ISO-8601 reset time into a DateTime<Utc>
    /// Accepts a Z suffix or an explicit offset, with 0, 3 or 6 fractional digits
    pub fn parse(timestamp_str: &str) -> Result<DateTime<Utc>> {
        let trimmed = timestamp_str.trim();

        // RFC 3339 covers Z, +00:00 and any fractional precision
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&Utc));
        }

        // Some payloads drop the offset entirely; those are UTC
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }

    /// Convert fractional unix seconds into a DateTime<Utc>
    pub fn from_unix_seconds(seconds: f64) -> Result<DateTime<Utc>> {
        if !seconds.is_finite() {
            anyhow::bail!("Unix timestamp is not finite: {}", seconds);
        }

        let whole = seconds.floor();
        let nanos = ((seconds - whole) * 1_000_000_000.0).round() as u32;

        DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
            .ok_or_else(|| anyhow::anyhow!("Unix timestamp out of range: {}", seconds))
    }
}
