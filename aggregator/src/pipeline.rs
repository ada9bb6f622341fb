//! Rollup pipeline
//!
//! One run: confirm the backend is alive, make sure the destination index
//! exists, execute the bucket query, walk the result and write one derived
//! document per tuple. Every backend call is awaited before the next one is
//! issued. The first fatal error aborts the run; documents written before
//! it stay in the destination.

use crate::backend::SearchBackend;
use crate::config::RollupConfig;
use crate::error::{BackendError, RollupError};
use crate::provision::ensure_index;
use crate::walk::BucketWalker;
use crate::writer::{RollupWriter, WriteReceipt};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Backends older than this major version only accept the legacy
/// `interval` parameter of the date histogram.
const CALENDAR_INTERVAL_SINCE: u32 = 7;

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollupReport {
    pub backend_version: String,
    pub index_created: bool,
    pub index_acknowledged: bool,
    /// The response carried no outer aggregation; nothing was written
    pub data_absent: bool,
    pub outer_buckets: usize,
    /// Outer buckets dropped because their key is not text
    pub skipped_buckets: usize,
    pub written: Vec<WriteReceipt>,
}

pub struct RollupPipeline<'a, B: SearchBackend + ?Sized> {
    backend: &'a B,
    config: &'a RollupConfig,
}

impl<'a, B: SearchBackend + ?Sized> RollupPipeline<'a, B> {
    pub fn new(backend: &'a B, config: &'a RollupConfig) -> Self {
        Self { backend, config }
    }

    /// Execute one rollup run.
    pub async fn run(&self) -> Result<RollupReport, RollupError> {
        let result = self.execute().await;
        let status = if result.is_ok() { "ok" } else { "error" };
        crate::metrics::RUNS_TOTAL.with_label_values(&[status]).inc();
        if let Err(e) = &result {
            warn!("Rollup into {} failed: {}", self.config.dest_index, e);
        }
        result
    }

    async fn execute(&self) -> Result<RollupReport, RollupError> {
        let config = self.config;
        let query_error = |source| RollupError::Query {
            index: config.source_index.clone(),
            source,
        };

        let ping = self
            .backend
            .ping()
            .await
            .map_err(|source| RollupError::Connectivity {
                endpoint: self.backend.endpoint(),
                source,
            })?;
        info!(
            "Search backend at {} returned with code {} and version {}",
            self.backend.endpoint(),
            ping.status_code,
            ping.version
        );

        let provision =
            ensure_index(self.backend, &config.dest_index, config.dest_mappings.as_ref()).await?;

        if config.flush_source {
            self.backend
                .flush(&config.source_index)
                .await
                .map_err(query_error)?;
        }

        let legacy = ping
            .major_version()
            .map(|major| major < CALENDAR_INTERVAL_SINCE)
            .unwrap_or(false);
        let query = config.bucket_query().legacy_interval(legacy);
        let body = query.build();
        debug!("Bucket query on {}: {}", query.source_index(), body);

        let response = self
            .backend
            .search(query.source_index(), &body)
            .await
            .map_err(query_error)?;
        info!(
            "Query on {} took {} ms and matched {} documents",
            query.source_index(),
            response.took.unwrap_or(0),
            response.total_hits()
        );

        let mut report = RollupReport {
            backend_version: ping.version,
            index_created: provision.created,
            index_acknowledged: provision.acknowledged,
            data_absent: false,
            outer_buckets: 0,
            skipped_buckets: 0,
            written: Vec::new(),
        };

        let terms = response
            .terms(query.outer_name())
            .map_err(|e| query_error(BackendError::Decode(e.to_string())))?;
        let Some(terms) = terms else {
            warn!(
                "Response from {} has no aggregation named {}; nothing to roll up",
                query.source_index(),
                query.outer_name()
            );
            crate::metrics::DATA_ABSENT_TOTAL.inc();
            report.data_absent = true;
            crate::audit::rollup_completed(&config.source_index, &config.dest_index, 0, 0);
            return Ok(report);
        };

        let walker = BucketWalker::new(&terms, query.inner_name());
        report.outer_buckets = walker.outer_buckets();
        report.skipped_buckets = walker.skipped();
        if report.skipped_buckets > 0 {
            crate::metrics::BUCKETS_SKIPPED.inc_by(report.skipped_buckets as f64);
            warn!(
                "Skipped {} of {} buckets with a non-text key",
                report.skipped_buckets, report.outer_buckets
            );
        }

        let mut writer = RollupWriter::new(self.backend, &config.dest_index, &config.doc_type)
            .with_fields(&config.key_field, &config.marker)
            .with_strategy(config.id_strategy)
            .with_seed(config.id_seed);

        report.written.reserve(walker.expected_tuples());
        for tuple in walker.walk() {
            let receipt = writer.write(&tuple).await?;
            report.written.push(receipt);
        }

        crate::audit::rollup_completed(
            &config.source_index,
            &config.dest_index,
            report.written.len(),
            report.skipped_buckets,
        );
        info!(
            "Wrote {} documents to {}",
            report.written.len(),
            config.dest_index
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use esrollup_shared::types::aggregation::SearchResponse;
    use serde_json::json;

    #[tokio::test]
    async fn test_legacy_backend_gets_interval_param() {
        let backend = InMemoryBackend::new().with_version("6.8.23");
        backend.insert_source(
            "logstash-twitter",
            "1",
            json!({ "user": "alice", "@timestamp": "2017-01-02T10:00:00Z" }),
        );
        let config = RollupConfig::default();

        let report = RollupPipeline::new(&backend, &config).run().await.unwrap();
        assert_eq!(report.backend_version, "6.8.23");
        assert_eq!(report.written.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_source_before_query() {
        let backend = InMemoryBackend::new();
        backend.set_search_response("logstash-twitter", SearchResponse::default());
        backend.insert_source("logstash-twitter", "1", json!({ "user": "alice" }));
        let config = RollupConfig {
            flush_source: true,
            ..RollupConfig::default()
        };

        let report = RollupPipeline::new(&backend, &config).run().await.unwrap();
        assert!(report.data_absent);
        assert_eq!(backend.flush_calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_aggregation_is_query_error() {
        let backend = InMemoryBackend::new();
        let response: SearchResponse =
            serde_json::from_value(json!({ "aggregations": { "timeline": { "buckets": 5 } } }))
                .unwrap();
        backend.set_search_response("logstash-twitter", response);
        let config = RollupConfig::default();

        let err = RollupPipeline::new(&backend, &config).run().await.unwrap_err();
        assert!(matches!(
            err,
            RollupError::Query {
                source: BackendError::Decode(_),
                ..
            }
        ));
    }
}
