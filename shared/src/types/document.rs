//! Document types flowing through the rollup
//!
//! `SourceDocument` is what producers write into the source index,
//! `RollupTuple` is the flattened (key, bucket, count) triple produced by
//! walking the aggregation tree, and `DerivedDocument` is what the rollup
//! writes into the destination index.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw event record in the source index. Only the fields the rollup
/// groups and buckets on are modelled; anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Grouping key, e.g. a user name
    pub user: String,

    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceDocument {
    pub fn new(user: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            timestamp,
            extra: Map::new(),
        }
    }
}

/// One (outer key, inner bucket label, count) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollupTuple {
    pub key: String,
    pub label: String,
    pub count: u64,
}

impl RollupTuple {
    pub fn new(key: impl Into<String>, label: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            count,
        }
    }
}

/// Summary record written to the destination index, one per tuple.
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedDocument {
    /// Identifier the document is stored under
    pub id: String,

    /// Name of the field carrying the grouping key (e.g. `user`)
    pub key_field: String,

    pub key: String,

    /// Fixed marker identifying the rollup that produced the document
    pub marker: String,

    pub count: u64,

    /// Label of the time bucket the count belongs to
    pub bucket: String,

    pub created: DateTime<Utc>,
}

impl DerivedDocument {
    pub fn from_tuple(
        id: impl Into<String>,
        key_field: impl Into<String>,
        marker: impl Into<String>,
        tuple: &RollupTuple,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            key_field: key_field.into(),
            key: tuple.key.clone(),
            marker: marker.into(),
            count: tuple.count,
            bucket: tuple.label.clone(),
            created,
        }
    }

    /// JSON body as stored in the destination index. The identifier is not
    /// part of the body; it addresses the document.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert(self.key_field.clone(), Value::String(self.key.clone()));
        body.insert("message".to_string(), Value::String(self.marker.clone()));
        body.insert("count".to_string(), Value::from(self.count));
        body.insert("bucket".to_string(), Value::String(self.bucket.clone()));
        body.insert(
            "created".to_string(),
            Value::String(self.created.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Value::Object(body)
    }
}
