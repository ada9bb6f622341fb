//! Prometheus metrics for rollup runs and partial updates

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

// ── Run metrics ──────────────────────────────────────────────────────────────

pub static RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("esrollup_runs_total", "Rollup runs by outcome", &["status"]).unwrap()
});

pub static DATA_ABSENT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "esrollup_data_absent_total",
        "Runs whose response lacked the outer aggregation"
    )
    .unwrap()
});

// ── Bucket metrics ───────────────────────────────────────────────────────────

pub static BUCKETS_SKIPPED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "esrollup_buckets_skipped_total",
        "Outer buckets dropped because their key is not text"
    )
    .unwrap()
});

// ── Index metrics ────────────────────────────────────────────────────────────

pub static INDEX_CREATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "esrollup_index_created_total",
        "Destination index creations",
        &["acknowledged"]
    )
    .unwrap()
});

// ── Write metrics ────────────────────────────────────────────────────────────

pub static DOCS_WRITTEN: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "esrollup_documents_written_total",
        "Derived documents written"
    )
    .unwrap()
});

pub static WRITE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "esrollup_write_duration_seconds",
        "Derived document write latency",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap()
});

pub static UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "esrollup_updates_total",
        "Scripted partial updates by outcome",
        &["status"]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_touched_metrics() {
        BUCKETS_SKIPPED.inc_by(0.0);
        RUNS_TOTAL.with_label_values(&["ok"]).inc_by(0.0);
        let text = encode_metrics();
        assert!(text.contains("esrollup_buckets_skipped_total"));
        assert!(text.contains("esrollup_runs_total"));
    }
}
