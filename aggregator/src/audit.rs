//! Audit logging for changes made to the search backend.
//!
//! All events are emitted via `tracing` with a dedicated target so they can be
//! filtered and formatted (e.g. JSON) for audit pipelines.

use tracing::{info, warn};

const AUDIT_TARGET: &str = "esrollup::audit";

/// Log creation of an index.
pub fn index_created(index: &str, acknowledged: bool) {
    if acknowledged {
        info!(
            target: AUDIT_TARGET,
            event = "index_created",
            index = %index,
            acknowledged = true,
        );
    } else {
        warn!(
            target: AUDIT_TARGET,
            event = "index_created",
            index = %index,
            acknowledged = false,
        );
    }
}

/// Log the end of a successful rollup run.
pub fn rollup_completed(source: &str, destination: &str, written: usize, skipped: usize) {
    info!(
        target: AUDIT_TARGET,
        event = "rollup_completed",
        source = %source,
        destination = %destination,
        written = written,
        skipped_buckets = skipped,
    );
}

/// Log a scripted update applied to a single document.
pub fn document_updated(index: &str, id: &str, version: u64, result: &str) {
    info!(
        target: AUDIT_TARGET,
        event = "document_updated",
        index = %index,
        id = %id,
        version = version,
        result = %result,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_target_is_static() {
        assert_eq!(AUDIT_TARGET, "esrollup::audit");
    }
}
