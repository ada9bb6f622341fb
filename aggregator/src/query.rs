//! Bucket query builder
//!
//! Assembles the aggregation-only search request: every document of the
//! source index, no hits returned, grouped by a terms aggregation with a
//! date histogram nested under it. The builder does no I/O and no
//! validation; malformed field names or intervals are rejected by the
//! backend when the query runs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default name of the outer (terms) aggregation
pub const DEFAULT_OUTER_AGG: &str = "timeline";
/// Default name of the inner (date histogram) aggregation
pub const DEFAULT_INNER_AGG: &str = "history";

/// Ordering of the outer buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketOrder {
    #[default]
    CountDesc,
    CountAsc,
    KeyAsc,
    KeyDesc,
}

impl BucketOrder {
    pub fn to_json(self) -> Value {
        match self {
            BucketOrder::CountDesc => json!({ "_count": "desc" }),
            BucketOrder::CountAsc => json!({ "_count": "asc" }),
            BucketOrder::KeyAsc => json!({ "_key": "asc" }),
            BucketOrder::KeyDesc => json!({ "_key": "desc" }),
        }
    }
}

impl FromStr for BucketOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "count_desc" => Ok(BucketOrder::CountDesc),
            "count_asc" => Ok(BucketOrder::CountAsc),
            "key_asc" => Ok(BucketOrder::KeyAsc),
            "key_desc" => Ok(BucketOrder::KeyDesc),
            _ => Err(format!("Invalid bucket order: {}", s)),
        }
    }
}

/// Calendar-aware histogram units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl CalendarUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            CalendarUnit::Minute => "minute",
            CalendarUnit::Hour => "hour",
            CalendarUnit::Day => "day",
            CalendarUnit::Week => "week",
            CalendarUnit::Month => "month",
            CalendarUnit::Quarter => "quarter",
            CalendarUnit::Year => "year",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let unit = match s {
            "minute" | "1m" => CalendarUnit::Minute,
            "hour" | "1h" => CalendarUnit::Hour,
            "day" | "1d" => CalendarUnit::Day,
            "week" | "1w" => CalendarUnit::Week,
            "month" | "1M" => CalendarUnit::Month,
            "quarter" | "1q" => CalendarUnit::Quarter,
            "year" | "1y" => CalendarUnit::Year,
            _ => return None,
        };
        Some(unit)
    }
}

/// Histogram bucket width.
///
/// Parsing never fails: strings that are neither a calendar unit nor a
/// fixed duration are kept verbatim and left for the backend to judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interval {
    Calendar(CalendarUnit),
    Fixed { raw: String, width: Duration },
    Other(String),
}

impl Interval {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some(unit) = CalendarUnit::parse(s) {
            return Interval::Calendar(unit);
        }
        match parse_fixed(s) {
            Some(width) => Interval::Fixed {
                raw: s.to_string(),
                width,
            },
            None => Interval::Other(s.to_string()),
        }
    }

    /// Parameter name and value for the date histogram. Legacy backends
    /// (before 7.x) only understand the single `interval` parameter.
    pub fn histogram_param(&self, legacy: bool) -> (&'static str, String) {
        match (self, legacy) {
            (Interval::Calendar(unit), false) => ("calendar_interval", unit.as_str().to_string()),
            (Interval::Fixed { raw, .. }, false) => ("fixed_interval", raw.clone()),
            (Interval::Calendar(unit), true) => ("interval", unit.as_str().to_string()),
            (Interval::Fixed { raw, .. }, true) => ("interval", raw.clone()),
            (Interval::Other(raw), _) => ("interval", raw.clone()),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Calendar(unit) => f.write_str(unit.as_str()),
            Interval::Fixed { raw, .. } | Interval::Other(raw) => f.write_str(raw),
        }
    }
}

impl From<&str> for Interval {
    fn from(s: &str) -> Self {
        Interval::parse(s)
    }
}

/// `<n><unit>` with unit one of ms, s, m, h, d and n > 0
fn parse_fixed(s: &str) -> Option<Duration> {
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let (num, unit) = s.split_at(split);
    let n: u64 = num.parse().ok().filter(|n| *n > 0)?;
    let width = match unit {
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n.checked_mul(60)?),
        "h" => Duration::from_secs(n.checked_mul(3600)?),
        "d" => Duration::from_secs(n.checked_mul(86_400)?),
        _ => return None,
    };
    Some(width)
}

/// Description of the two-level rollup aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketQuery {
    source_index: String,
    group_field: String,
    time_field: String,
    interval: Interval,
    bucket_size: u32,
    order: BucketOrder,
    outer_name: String,
    inner_name: String,
    legacy_interval: bool,
}

impl BucketQuery {
    pub fn new(
        source_index: impl Into<String>,
        group_field: impl Into<String>,
        time_field: impl Into<String>,
        interval: impl Into<Interval>,
        bucket_size: u32,
        order: BucketOrder,
    ) -> Self {
        Self {
            source_index: source_index.into(),
            group_field: group_field.into(),
            time_field: time_field.into(),
            interval: interval.into(),
            bucket_size,
            order,
            outer_name: DEFAULT_OUTER_AGG.to_string(),
            inner_name: DEFAULT_INNER_AGG.to_string(),
            legacy_interval: false,
        }
    }

    /// Rename the outer and inner aggregations.
    pub fn with_names(mut self, outer: impl Into<String>, inner: impl Into<String>) -> Self {
        self.outer_name = outer.into();
        self.inner_name = inner.into();
        self
    }

    /// Emit the pre-7.x `interval` parameter instead of calendar/fixed intervals.
    pub fn legacy_interval(mut self, legacy: bool) -> Self {
        self.legacy_interval = legacy;
        self
    }

    pub fn source_index(&self) -> &str {
        &self.source_index
    }

    pub fn outer_name(&self) -> &str {
        &self.outer_name
    }

    pub fn inner_name(&self) -> &str {
        &self.inner_name
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    /// Request body for the search endpoint.
    pub fn build(&self) -> Value {
        let (interval_key, interval_value) = self.interval.histogram_param(self.legacy_interval);

        let mut histogram = serde_json::Map::new();
        histogram.insert("field".to_string(), json!(self.time_field));
        histogram.insert(interval_key.to_string(), json!(interval_value));

        json!({
            "query": { "match_all": {} },
            "size": 0,
            "aggs": {
                self.outer_name.as_str(): {
                    "terms": {
                        "field": self.group_field,
                        "size": self.bucket_size,
                        "order": self.order.to_json(),
                    },
                    "aggs": {
                        self.inner_name.as_str(): {
                            "date_histogram": histogram,
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly() -> BucketQuery {
        BucketQuery::new(
            "logstash-twitter",
            "user.keyword",
            "@timestamp",
            "week",
            20,
            BucketOrder::CountDesc,
        )
    }

    #[test]
    fn test_build_weekly_query() {
        let body = weekly().build();
        assert_eq!(
            body,
            json!({
                "query": { "match_all": {} },
                "size": 0,
                "aggs": {
                    "timeline": {
                        "terms": {
                            "field": "user.keyword",
                            "size": 20,
                            "order": { "_count": "desc" }
                        },
                        "aggs": {
                            "history": {
                                "date_histogram": {
                                    "field": "@timestamp",
                                    "calendar_interval": "week"
                                }
                            }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_legacy_interval() {
        let body = weekly().legacy_interval(true).build();
        assert_eq!(
            body["aggs"]["timeline"]["aggs"]["history"]["date_histogram"]["interval"],
            "week"
        );
        assert!(body["aggs"]["timeline"]["aggs"]["history"]["date_histogram"]
            .get("calendar_interval")
            .is_none());
    }

    #[test]
    fn test_custom_names_and_order() {
        let q = BucketQuery::new("src", "host", "ts", "30m", 5, BucketOrder::KeyAsc)
            .with_names("hosts", "per_half_hour");
        let body = q.build();
        let outer = &body["aggs"]["hosts"];
        assert_eq!(outer["terms"]["order"], json!({ "_key": "asc" }));
        assert_eq!(outer["terms"]["size"], 5);
        assert_eq!(
            outer["aggs"]["per_half_hour"]["date_histogram"]["fixed_interval"],
            "30m"
        );
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!(Interval::parse("hour"), Interval::Calendar(CalendarUnit::Hour));
        assert_eq!(Interval::parse("1w"), Interval::Calendar(CalendarUnit::Week));
        assert_eq!(
            Interval::parse("12h"),
            Interval::Fixed {
                raw: "12h".to_string(),
                width: Duration::from_secs(12 * 3600)
            }
        );
        assert_eq!(Interval::parse("fortnight"), Interval::Other("fortnight".to_string()));
        assert_eq!(Interval::parse("0s"), Interval::Other("0s".to_string()));
    }

    #[test]
    fn test_unknown_interval_passes_through() {
        let q = BucketQuery::new("src", "user", "ts", "fortnight", 10, BucketOrder::CountDesc);
        let body = q.build();
        assert_eq!(
            body["aggs"]["timeline"]["aggs"]["history"]["date_histogram"]["interval"],
            "fortnight"
        );
    }

    #[test]
    fn test_oversized_fixed_interval_passes_through() {
        let q = BucketQuery::new(
            "src",
            "user",
            "ts",
            "5124095576030432h",
            10,
            BucketOrder::CountDesc,
        );
        assert_eq!(
            q.interval(),
            &Interval::Other("5124095576030432h".to_string())
        );
        assert_eq!(
            q.build()["aggs"]["timeline"]["aggs"]["history"]["date_histogram"]["interval"],
            "5124095576030432h"
        );
    }

    #[test]
    fn test_order_from_str() {
        assert_eq!("count_desc".parse::<BucketOrder>().unwrap(), BucketOrder::CountDesc);
        assert_eq!("KEY-ASC".parse::<BucketOrder>().unwrap(), BucketOrder::KeyAsc);
        assert!("random".parse::<BucketOrder>().is_err());
    }
}
