//! Time-related utilities

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Get the current system time in milliseconds since UNIX epoch
pub fn system_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Format a timestamp the way the backend formats date fields
/// (`2017-01-02T00:00:00.000Z`).
pub fn to_backend_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a date field value: an RFC 3339 string or epoch milliseconds.
pub fn parse_backend_time(raw: &serde_json::Value) -> Option<DateTime<Utc>> {
    match raw {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)),
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_system_time() {
        let millis = system_time_millis();
        assert!(millis > 1_600_000_000_000); // After 2020
        assert!(now_utc().timestamp_millis() >= millis);
    }

    #[test]
    fn test_backend_string() {
        let ts = Utc.with_ymd_and_hms(2017, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(to_backend_string(&ts), "2017-01-02T00:00:00.000Z");
    }

    #[test]
    fn test_parse_backend_time() {
        let ts = Utc.with_ymd_and_hms(2017, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(parse_backend_time(&json!("2017-01-02T00:00:00Z")), Some(ts));
        assert_eq!(parse_backend_time(&json!("2017-01-02T01:00:00+01:00")), Some(ts));
        assert_eq!(parse_backend_time(&json!(1483315200000i64)), Some(ts));
        assert_eq!(parse_backend_time(&json!("1483315200000")), Some(ts));
        assert_eq!(parse_backend_time(&json!("yesterday")), None);
        assert_eq!(parse_backend_time(&json!(true)), None);
    }
}
