//! Formatting helpers shared by the viewer and the replay dump.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Format a duration in seconds (e.g., "1.234 s").
pub fn format_seconds(seconds: f64) -> String {
    format!("{seconds:.3} s")
}

/// Format query/response token counts (e.g., "120 → 48 tok").
pub fn format_tokens(query: i64, response: i64) -> String {
    format!("{} → {} tok", format_count(query), format_count(response))
}

/// Format a count compactly (e.g., 1234 → "1.2k").
pub fn format_count(n: i64) -> String {
    let abs = n.unsigned_abs();
    if abs >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if abs >= 1_000 {
        format!("{:.1}k", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

/// Parse the timestamp text a server sends.
///
/// Accepts RFC 3339 and naive `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Timestamp text trimmed to whole seconds; unparsable text is returned as is.
pub fn format_timestamp(text: &str) -> String {
    match parse_timestamp(text) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => text.to_string(),
    }
}

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    format_relative_time_at(ts, Utc::now())
}

fn format_relative_time_at(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

/// Relative time for optional timestamp text, or "-" if missing.
pub fn format_relative_text(text: Option<&str>) -> String {
    match text {
        Some(text) => parse_timestamp(text)
            .map(format_relative_time)
            .unwrap_or_else(|| text.to_string()),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(1.23456), "1.235 s");
        assert_eq!(format_seconds(0.0), "0.000 s");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1234), "1.2k");
        assert_eq!(format_count(2_500_000), "2.5M");
        assert_eq!(format_tokens(120, 48), "120 → 48 tok");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 3).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T10:00:03Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 10:00:03"), Some(expected));
        assert_eq!(
            format_timestamp("2024-05-01 10:00:03.512"),
            "2024-05-01 10:00:03"
        );
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn test_relative_time() {
        let now = Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time_at(now - Duration::seconds(5), now), "5s ago");
        assert_eq!(format_relative_time_at(now - Duration::minutes(3), now), "3m ago");
        assert_eq!(format_relative_time_at(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_relative_time_at(now + Duration::seconds(5), now), "just now");
        assert_eq!(format_relative_text(None), "-");
    }
}
