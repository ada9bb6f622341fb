//! E2E test: seed raw events → rollup → read back derived documents.
//!
//! Requires a running Elasticsearch. Run via:
//!   ESROLLUP_ENDPOINT=http://127.0.0.1:9200 cargo test --test e2e_elasticsearch -- --ignored --nocapture

use esrollup_aggregator::backend::{HttpBackend, PutMode, SearchBackend};
use esrollup_aggregator::ids::IdStrategy;
use esrollup_aggregator::{apply_update, RollupConfig, RollupPipeline, ScriptedUpdate};
use esrollup_shared::types::document::SourceDocument;
use esrollup_shared::utils::time::system_time_millis;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::time::Duration;

const ES_ENDPOINT: &str = "http://127.0.0.1:9200";

fn endpoint() -> String {
    std::env::var("ESROLLUP_ENDPOINT").unwrap_or_else(|_| ES_ENDPOINT.to_string())
}

#[tokio::test]
#[ignore] // Run explicitly via: cargo test --test e2e_elasticsearch -- --ignored --nocapture
async fn e2e_rollup_and_update() {
    let backend = HttpBackend::new(&endpoint(), Duration::from_secs(10)).expect("build client");
    let suffix = system_time_millis();
    let source_index = format!("esrollup-e2e-source-{suffix}");
    let dest_index = format!("esrollup-e2e-weekly-{suffix}");

    backend
        .create_index(
            &source_index,
            Some(&json!({
                "mappings": { "properties": {
                    "user": { "type": "keyword" },
                    "@timestamp": { "type": "date" }
                }}
            })),
        )
        .await
        .expect("create source index");

    let events = [("alice", 2), ("alice", 3), ("alice", 10), ("bob", 4)];
    for (i, (user, day)) in events.into_iter().enumerate() {
        let ts = Utc.with_ymd_and_hms(2017, 1, day, 12, 0, 0).unwrap();
        let doc = serde_json::to_value(SourceDocument::new(user, ts)).unwrap();
        backend
            .put(&source_index, "_doc", &(i + 1).to_string(), &doc, PutMode::Create)
            .await
            .expect("seed event");
    }

    let config = RollupConfig {
        endpoint: endpoint(),
        source_index: source_index.clone(),
        dest_index: dest_index.clone(),
        group_field: "user".to_string(),
        id_strategy: IdStrategy::Sequential,
        flush_source: true,
        ..RollupConfig::default()
    };
    let report = RollupPipeline::new(&backend, &config)
        .run()
        .await
        .expect("rollup run");

    assert!(report.index_created);
    assert!(!report.data_absent);
    assert_eq!(report.outer_buckets, 2);
    assert_eq!(report.written.len(), 3);

    let first = backend.get(&dest_index, "_doc", "1").await.expect("get");
    assert!(first.found);
    let source = first.source.expect("source");
    assert_eq!(source["user"], "alice");
    assert_eq!(source["message"], "weekly");
    assert_eq!(source["count"], 2);

    let update = ScriptedUpdate::new("ctx._source.count += params.num").param("num", 10);
    let outcome = apply_update(&backend, &dest_index, "_doc", "1", &update)
        .await
        .expect("update");
    assert_eq!(outcome.result, "updated");
    assert!(outcome.version > first.version.unwrap_or(0));

    let updated = backend.get(&dest_index, "_doc", "1").await.expect("get");
    assert_eq!(updated.source.expect("source")["count"], 12);
}
