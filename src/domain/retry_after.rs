//! Retry-After Parsing
//!
//! Parses the `Retry-After` header in either of its RFC 9110 forms:
//! delta-seconds ("120") or an HTTP-date ("Wed, 21 Oct 2015 07:28:00 GMT").
//! Decimal seconds are accepted as well since some providers send them.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::time::Duration;

/// Parse a Retry-After value relative to `now`.
///
/// Returns `None` when the value is neither delta-seconds nor a date.
/// Negative deltas and dates in the past yield `Duration::ZERO`; deltas
/// beyond `Duration`'s range (including infinity) yield `Duration::MAX`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_nan() {
            return None;
        }
        // too large for Duration still means "wait as long as allowed"
        return Some(Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX));
    }

    let at = parse_http_date(value)?;
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Parse a Retry-After value and clamp it into `[0, cap]`.
///
/// Unparseable values produce zero: the caller proceeds without an extra wait.
pub fn capped_delay(value: &str, cap: Duration, now: DateTime<Utc>) -> Duration {
    match parse_retry_after(value, now) {
        Some(delay) => delay.min(cap),
        None => {
            tracing::debug!("Ignoring unparseable Retry-After value: {:?}", value);
            Duration::ZERO
        }
    }
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    // IMF-fixdate, e.g. "Sun, 06 Nov 1994 08:49:37 GMT"
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // Obsolete RFC 850 form, e.g. "Sunday, 06-Nov-94 08:49:37 GMT"
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    // asctime, e.g. "Sun Nov  6 08:49:37 1994"
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    None
}
