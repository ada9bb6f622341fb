//! Bucket tree walker
//!
//! Flattens the two-level aggregation tree into `RollupTuple`s: one tuple
//! per (outer bucket, inner bucket) pair, in backend order. Outer buckets
//! whose key is not text are dropped, and counted so the caller can report
//! them.

use esrollup_shared::types::aggregation::{AggregationResult, InnerBucket, OuterBucket};
use esrollup_shared::types::document::RollupTuple;
use std::slice;
use std::vec;

/// Walks an already materialized aggregation result.
#[derive(Debug, Clone, Copy)]
pub struct BucketWalker<'a> {
    result: &'a AggregationResult,
    inner_name: &'a str,
}

impl<'a> BucketWalker<'a> {
    pub fn new(result: &'a AggregationResult, inner_name: &'a str) -> Self {
        Self { result, inner_name }
    }

    /// Lazy sequence of tuples. Call again to restart from the first bucket.
    pub fn walk(&self) -> Walk<'a> {
        Walk {
            outer: self.result.buckets.iter(),
            inner_name: self.inner_name,
            current: None,
        }
    }

    /// Number of outer buckets in the result.
    pub fn outer_buckets(&self) -> usize {
        self.result.buckets.len()
    }

    /// Outer buckets dropped because their key is not text.
    pub fn skipped(&self) -> usize {
        self.result
            .buckets
            .iter()
            .filter(|b| b.text_key().is_none())
            .count()
    }

    /// Number of tuples `walk` yields.
    pub fn expected_tuples(&self) -> usize {
        self.result
            .buckets
            .iter()
            .filter(|b| b.text_key().is_some())
            .filter_map(|b| b.date_histogram(self.inner_name).ok().flatten())
            .map(|h| h.buckets.len())
            .sum()
    }
}

/// Iterator returned by [`BucketWalker::walk`].
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    outer: slice::Iter<'a, OuterBucket>,
    inner_name: &'a str,
    current: Option<(&'a str, vec::IntoIter<InnerBucket>)>,
}

impl<'a> Walk<'a> {
    fn advance_outer(&mut self) -> bool {
        for bucket in self.outer.by_ref() {
            let Some(key) = bucket.text_key() else {
                tracing::debug!("Skipping bucket with non-text key {}", bucket.key);
                continue;
            };
            match bucket.date_histogram(self.inner_name) {
                Ok(Some(histogram)) => {
                    self.current = Some((key, histogram.buckets.into_iter()));
                    return true;
                }
                Err(e) => {
                    tracing::warn!("Dropping bucket {:?}: {}", key, e);
                }
                Ok(None) => {
                    tracing::debug!(
                        "Bucket {:?} has no {:?} sub-aggregation",
                        key,
                        self.inner_name
                    );
                }
            }
        }
        false
    }
}

impl Iterator for Walk<'_> {
    type Item = RollupTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, inner)) = self.current.as_mut() {
                if let Some(bucket) = inner.next() {
                    return Some(RollupTuple::new(*key, bucket.label(), bucket.doc_count));
                }
                self.current = None;
            }
            if !self.advance_outer() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(buckets: serde_json::Value) -> AggregationResult {
        serde_json::from_value(json!({ "buckets": buckets })).unwrap()
    }

    fn alice() -> AggregationResult {
        result(json!([
            {
                "key": "alice",
                "doc_count": 8,
                "history": { "buckets": [
                    { "key_as_string": "2017-01-01", "key": 1483228800000u64, "doc_count": 3 },
                    { "key_as_string": "2017-01-08", "key": 1483833600000u64, "doc_count": 5 }
                ]}
            }
        ]))
    }

    #[test]
    fn test_alice_example() {
        let agg = alice();
        let walker = BucketWalker::new(&agg, "history");
        let tuples: Vec<_> = walker.walk().collect();
        assert_eq!(
            tuples,
            vec![
                RollupTuple::new("alice", "2017-01-01", 3),
                RollupTuple::new("alice", "2017-01-08", 5),
            ]
        );
        assert_eq!(walker.expected_tuples(), 2);
        assert_eq!(walker.skipped(), 0);
    }

    #[test]
    fn test_walk_is_restartable() {
        let agg = alice();
        let walker = BucketWalker::new(&agg, "history");
        let mut first = walker.walk();
        first.next();
        let resumed = first.clone();
        assert_eq!(resumed.count(), 1);
        assert_eq!(walker.walk().count(), 2);
        assert_eq!(walker.walk().count(), 2);
    }

    #[test]
    fn test_numeric_keys_are_dropped() {
        let agg = result(json!([
            { "key": 42, "doc_count": 7, "history": { "buckets": [
                { "key_as_string": "2017-01-01", "key": 1, "doc_count": 7 }
            ]}},
            { "key": "bob", "doc_count": 1, "history": { "buckets": [
                { "key_as_string": "2017-01-01", "key": 1, "doc_count": 1 }
            ]}}
        ]));
        let walker = BucketWalker::new(&agg, "history");
        let tuples: Vec<_> = walker.walk().collect();
        assert_eq!(tuples, vec![RollupTuple::new("bob", "2017-01-01", 1)]);
        assert_eq!(walker.skipped(), 1);
        assert_eq!(walker.outer_buckets(), 2);
    }

    #[test]
    fn test_missing_inner_aggregation() {
        let agg = result(json!([
            { "key": "carol", "doc_count": 2 },
            { "key": "dave", "doc_count": 1, "history": { "buckets": [
                { "key_as_string": "2017-01-15", "key": 1, "doc_count": 1 }
            ]}}
        ]));
        let walker = BucketWalker::new(&agg, "history");
        let tuples: Vec<_> = walker.walk().collect();
        assert_eq!(tuples, vec![RollupTuple::new("dave", "2017-01-15", 1)]);
        assert_eq!(walker.skipped(), 0);
    }

    #[test]
    fn test_malformed_inner_aggregation_is_dropped() {
        let agg = result(json!([
            { "key": "erin", "doc_count": 4, "history": { "buckets": "garbled" } },
            { "key": "frank", "doc_count": 2, "history": { "buckets": [
                { "key_as_string": "2017-01-22", "key": 1, "doc_count": 2 }
            ]}}
        ]));
        let walker = BucketWalker::new(&agg, "history");
        let tuples: Vec<_> = walker.walk().collect();
        assert_eq!(tuples, vec![RollupTuple::new("frank", "2017-01-22", 2)]);
        assert_eq!(walker.expected_tuples(), 1);
    }

    #[test]
    fn test_order_is_preserved() {
        let agg = result(json!([
            { "key": "zed", "doc_count": 9, "history": { "buckets": [
                { "key_as_string": "w1", "key": 1, "doc_count": 4 },
                { "key_as_string": "w2", "key": 2, "doc_count": 5 }
            ]}},
            { "key": "amy", "doc_count": 3, "history": { "buckets": [
                { "key_as_string": "w2", "key": 2, "doc_count": 3 }
            ]}}
        ]));
        let walker = BucketWalker::new(&agg, "history");
        let labels: Vec<_> = walker.walk().map(|t| format!("{}@{}", t.key, t.label)).collect();
        assert_eq!(labels, vec!["zed@w1", "zed@w2", "amy@w2"]);
        assert_eq!(walker.expected_tuples(), 3);
    }

    #[test]
    fn test_empty_result() {
        let agg = AggregationResult::default();
        let walker = BucketWalker::new(&agg, "history");
        assert_eq!(walker.walk().count(), 0);
        assert_eq!(walker.expected_tuples(), 0);
    }
}
