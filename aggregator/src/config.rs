//! Rollup configuration
//!
//! Values come from (lowest to highest precedence) the built-in defaults,
//! an optional TOML/JSON/YAML file, and `ESROLLUP_*` environment variables.
//! The CLI applies its flags on top of the loaded value.

use crate::error::RollupError;
use crate::ids::IdStrategy;
use crate::query::{BucketOrder, BucketQuery, Interval};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment variables overriding configuration keys
pub const ENV_PREFIX: &str = "ESROLLUP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    /// Search backend base URL
    pub endpoint: String,

    /// Basic auth user name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic auth password (usually from ESROLLUP_PASSWORD)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Index holding the raw events
    pub source_index: String,

    /// Index receiving derived documents
    pub dest_index: String,

    /// Document type label used for writes. "_doc" suits 6.x and later;
    /// 5.x clusters reject it and need an explicit type such as "tweet".
    pub doc_type: String,

    /// Settings/mappings body sent when the destination index is created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_mappings: Option<serde_json::Value>,

    /// Field the outer terms aggregation groups on
    pub group_field: String,

    /// Timestamp field of the inner date histogram
    pub time_field: String,

    /// Histogram interval (calendar unit such as "week", or fixed like "30m")
    pub interval: String,

    /// Maximum number of outer buckets
    pub bucket_size: u32,

    pub order: BucketOrder,

    pub outer_agg: String,

    pub inner_agg: String,

    /// Field of the derived document carrying the grouping key
    pub key_field: String,

    /// Fixed marker stored in every derived document
    pub marker: String,

    pub id_strategy: IdStrategy,

    /// First value of the sequential id counter
    pub id_seed: u64,

    /// Flush the source index before querying so recent external writes are visible
    pub flush_source: bool,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9200".to_string(),
            username: None,
            password: None,
            request_timeout_secs: 30,
            source_index: "logstash-twitter".to_string(),
            dest_index: "twitter-weekly".to_string(),
            doc_type: "_doc".to_string(),
            dest_mappings: None,
            group_field: "user.keyword".to_string(),
            time_field: "@timestamp".to_string(),
            interval: "week".to_string(),
            bucket_size: 20,
            order: BucketOrder::CountDesc,
            outer_agg: crate::query::DEFAULT_OUTER_AGG.to_string(),
            inner_agg: crate::query::DEFAULT_INNER_AGG.to_string(),
            key_field: "user".to_string(),
            marker: "weekly".to_string(),
            id_strategy: IdStrategy::Sequential,
            id_seed: 1,
            flush_source: false,
        }
    }
}

impl RollupConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, RollupError> {
        let defaults = config::Config::try_from(&RollupConfig::default()).map_err(config_error)?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: RollupConfig = builder
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration. Field names and intervals are left to the backend.
    pub fn validate(&self) -> Result<(), RollupError> {
        let required = [
            ("endpoint", &self.endpoint),
            ("source_index", &self.source_index),
            ("dest_index", &self.dest_index),
            ("group_field", &self.group_field),
            ("time_field", &self.time_field),
            ("interval", &self.interval),
            ("outer_agg", &self.outer_agg),
            ("inner_agg", &self.inner_agg),
            ("key_field", &self.key_field),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(RollupError::Config(format!("{} must not be empty", name)));
            }
        }

        if self.bucket_size == 0 {
            return Err(RollupError::Config(
                "bucket_size must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(RollupError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.outer_agg == self.inner_agg {
            return Err(RollupError::Config(
                "outer_agg and inner_agg must differ".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Aggregation query described by this configuration.
    pub fn bucket_query(&self) -> BucketQuery {
        BucketQuery::new(
            self.source_index.clone(),
            self.group_field.clone(),
            self.time_field.clone(),
            Interval::parse(&self.interval),
            self.bucket_size,
            self.order,
        )
        .with_names(self.outer_agg.clone(), self.inner_agg.clone())
    }
}

fn config_error(e: config::ConfigError) -> RollupError {
    RollupError::Config(e.to_string())
}
