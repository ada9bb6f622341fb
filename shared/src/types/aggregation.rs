//! Search response and aggregation tree types
//!
//! These types mirror the subset of the search backend's JSON response that
//! the rollup needs: the hit total and a two-level bucket tree (terms buckets
//! with a nested date histogram).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Errors raised while decoding a named aggregation out of a response
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("aggregation {name:?} has an unexpected shape: {source}")]
    Shape {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Hit total. Older backends return a bare number, newer ones an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HitTotal {
    Count(u64),
    Detailed { value: u64, relation: String },
}

impl HitTotal {
    pub fn value(&self) -> u64 {
        match self {
            HitTotal::Count(n) => *n,
            HitTotal::Detailed { value, .. } => *value,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: Option<HitTotal>,
}

/// Response of an aggregation-only search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Milliseconds the backend spent executing the search
    #[serde(default)]
    pub took: Option<u64>,

    #[serde(default)]
    pub timed_out: bool,

    #[serde(default)]
    pub hits: Hits,

    /// Top-level aggregations keyed by name
    #[serde(default)]
    pub aggregations: Option<Map<String, Value>>,
}

impl SearchResponse {
    /// Look up a terms aggregation by name.
    ///
    /// Returns `Ok(None)` when the response carries no aggregation of that name.
    pub fn terms(&self, name: &str) -> Result<Option<AggregationResult>, AggregationError> {
        let Some(raw) = self.aggregations.as_ref().and_then(|aggs| aggs.get(name)) else {
            return Ok(None);
        };
        AggregationResult::deserialize(raw)
            .map(Some)
            .map_err(|source| AggregationError::Shape {
                name: name.to_string(),
                source,
            })
    }

    /// Total number of documents matched by the query
    pub fn total_hits(&self) -> u64 {
        self.hits.total.as_ref().map(HitTotal::value).unwrap_or(0)
    }
}

/// A terms aggregation: ordered outer buckets, one per grouping key value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationResult {
    #[serde(default)]
    pub doc_count_error_upper_bound: Option<i64>,

    /// Documents whose key fell outside the requested `size`
    #[serde(default)]
    pub sum_other_doc_count: Option<u64>,

    #[serde(default)]
    pub buckets: Vec<OuterBucket>,
}

/// One grouping key with its document count and nested aggregations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OuterBucket {
    /// Raw key as reported by the backend (text for keyword fields,
    /// a number for numeric fields)
    pub key: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,

    pub doc_count: u64,

    /// Sub-aggregations keyed by name
    #[serde(flatten)]
    pub aggregations: Map<String, Value>,
}

impl OuterBucket {
    /// The key if the backend reported it as text.
    pub fn text_key(&self) -> Option<&str> {
        self.key.as_str()
    }

    /// Decode the named date-histogram sub-aggregation.
    ///
    /// Returns `Ok(None)` when the bucket carries no sub-aggregation of that name.
    pub fn date_histogram(&self, name: &str) -> Result<Option<DateHistogram>, AggregationError> {
        let Some(raw) = self.aggregations.get(name) else {
            return Ok(None);
        };
        DateHistogram::deserialize(raw)
            .map(Some)
            .map_err(|source| AggregationError::Shape {
                name: name.to_string(),
                source,
            })
    }
}

/// A date histogram: ordered fixed-width time buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateHistogram {
    #[serde(default)]
    pub buckets: Vec<InnerBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerBucket {
    /// Bucket start, usually epoch milliseconds
    pub key: Value,

    /// Formatted interval label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,

    pub doc_count: u64,
}

impl InnerBucket {
    /// The formatted label, falling back to the raw key rendered as text.
    pub fn label(&self) -> String {
        match (&self.key_as_string, &self.key) {
            (Some(label), _) => label.clone(),
            (None, Value::String(s)) => s.clone(),
            (None, other) => other.to_string(),
        }
    }
}
