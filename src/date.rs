//! RFC 7231 HTTP-date parsing and formatting.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, NaiveDateTime, Utc};
use http::header::DATE;
use http::HeaderMap;

/// Parse an HTTP date, trying the RFC 7231 formats in preference order:
/// IMF-fixdate, RFC 850, asctime, then RFC 2822 as a lenient fallback.
pub fn parse_http_date(raw: &str) -> Option<SystemTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%a, %d %b %Y %H:%M:%S GMT") {
        return to_system_time(dt.and_utc().timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%A, %d-%b-%y %H:%M:%S GMT") {
        return to_system_time(dt.and_utc().timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%a %b %e %H:%M:%S %Y") {
        return to_system_time(dt.and_utc().timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return to_system_time(dt.timestamp());
    }
    None
}

/// Format a timestamp as an IMF-fixdate string.
pub fn fmt_http_date(time: SystemTime) -> String {
    let secs = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let dt = DateTime::<Utc>::from_timestamp(secs as i64, 0).unwrap_or_default();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// The response's `Date` header as a timestamp, if present and parseable.
pub fn date_of(headers: &HeaderMap) -> Option<SystemTime> {
    headers
        .get(DATE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
}

fn to_system_time(timestamp: i64) -> Option<SystemTime> {
    u64::try_from(timestamp)
        .ok()
        .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
}
