//! Rollup writer
//!
//! Turns each tuple into a `DerivedDocument` and stores it under an
//! explicitly assigned id. With the sequential strategy documents are
//! created with `op_type=create`, so an id already present in the
//! destination surfaces as a conflict instead of a silent duplicate.

use crate::backend::{PutMode, SearchBackend};
use crate::error::RollupError;
use crate::ids::{content_id, IdSequence, IdStrategy};
use chrono::{DateTime, Utc};
use esrollup_shared::types::document::{DerivedDocument, RollupTuple};
use esrollup_shared::utils::time::now_utc;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// Where and when a derived document was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    pub id: String,
    pub index: String,
    pub created_at: DateTime<Utc>,
}

pub struct RollupWriter<'a, B: SearchBackend + ?Sized> {
    backend: &'a B,
    index: String,
    doc_type: String,
    key_field: String,
    marker: String,
    strategy: IdStrategy,
    ids: IdSequence,
}

impl<'a, B: SearchBackend + ?Sized> RollupWriter<'a, B> {
    pub fn new(backend: &'a B, index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            backend,
            index: index.into(),
            doc_type: doc_type.into(),
            key_field: "user".to_string(),
            marker: "weekly".to_string(),
            strategy: IdStrategy::Sequential,
            ids: IdSequence::default(),
        }
    }

    /// Field name for the grouping key and the fixed marker value.
    pub fn with_fields(mut self, key_field: impl Into<String>, marker: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self.marker = marker.into();
        self
    }

    pub fn with_strategy(mut self, strategy: IdStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// First id handed out by the sequential strategy.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.ids = IdSequence::starting_at(seed);
        self
    }

    fn mint_id(&mut self, tuple: &RollupTuple) -> (String, PutMode) {
        match self.strategy {
            IdStrategy::Sequential => (self.ids.next_id().to_string(), PutMode::Create),
            IdStrategy::ContentHash => (content_id(tuple), PutMode::Overwrite),
        }
    }

    /// Persist one derived document. Failures are not retried.
    pub async fn write(&mut self, tuple: &RollupTuple) -> Result<WriteReceipt, RollupError> {
        let (id, mode) = self.mint_id(tuple);
        let doc = DerivedDocument::from_tuple(
            id.clone(),
            self.key_field.clone(),
            self.marker.clone(),
            tuple,
            now_utc(),
        );

        let start = Instant::now();
        let put = self
            .backend
            .put(&self.index, &self.doc_type, &id, &doc.to_body(), mode)
            .await
            .map_err(|source| RollupError::Write {
                index: self.index.clone(),
                id: id.clone(),
                source,
            })?;
        crate::metrics::WRITE_DURATION.observe(start.elapsed().as_secs_f64());
        crate::metrics::DOCS_WRITTEN.inc();

        debug!(
            "Indexed {} ({} in {}: {}) to index {}, type {}",
            put.id, doc.key, doc.bucket, doc.count, put.index, put.doc_type
        );

        Ok(WriteReceipt {
            id: put.id,
            index: put.index,
            created_at: doc.created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::error::BackendError;

    #[tokio::test]
    async fn test_consecutive_ids() {
        let backend = InMemoryBackend::new();
        let mut writer = RollupWriter::new(&backend, "twitter-weekly", "_doc");

        let a = writer.write(&RollupTuple::new("alice", "2017-01-01", 3)).await.unwrap();
        let b = writer.write(&RollupTuple::new("alice", "2017-01-08", 5)).await.unwrap();
        assert_eq!(a.id, "1");
        assert_eq!(b.id, "2");
        assert_eq!(b.index, "twitter-weekly");

        let doc = backend.source("twitter-weekly", "2").unwrap();
        assert_eq!(doc["user"], "alice");
        assert_eq!(doc["count"], 5);
        assert_eq!(doc["message"], "weekly");
        assert_eq!(doc["bucket"], "2017-01-08");
    }

    #[tokio::test]
    async fn test_collision_is_fatal() {
        let backend = InMemoryBackend::new();
        let mut first = RollupWriter::new(&backend, "twitter-weekly", "_doc");
        first.write(&RollupTuple::new("alice", "2017-01-01", 3)).await.unwrap();

        // a second run starts from the same seed
        let mut second = RollupWriter::new(&backend, "twitter-weekly", "_doc");
        let err = second
            .write(&RollupTuple::new("bob", "2017-01-01", 1))
            .await
            .unwrap_err();
        match err {
            RollupError::Write { id, source, .. } => {
                assert_eq!(id, "1");
                assert!(matches!(source, BackendError::Conflict { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_content_hash_overwrites() {
        let backend = InMemoryBackend::new();
        let tuple = RollupTuple::new("alice", "2017-01-01", 3);

        for _ in 0..2 {
            let mut writer = RollupWriter::new(&backend, "twitter-weekly", "_doc")
                .with_strategy(IdStrategy::ContentHash);
            let receipt = writer.write(&tuple).await.unwrap();
            assert_eq!(receipt.id, content_id(&tuple));
        }
        assert_eq!(backend.documents("twitter-weekly").len(), 1);
    }

    #[tokio::test]
    async fn test_custom_fields_and_seed() {
        let backend = InMemoryBackend::new();
        let mut writer = RollupWriter::new(&backend, "hosts-hourly", "_doc")
            .with_fields("host", "hourly")
            .with_seed(500);

        let receipt = writer.write(&RollupTuple::new("web-1", "h1", 9)).await.unwrap();
        assert_eq!(receipt.id, "500");
        let doc = backend.source("hosts-hourly", "500").unwrap();
        assert_eq!(doc["host"], "web-1");
        assert_eq!(doc["message"], "hourly");
    }
}
