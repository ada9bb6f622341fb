//! Destination index provisioning

use crate::backend::SearchBackend;
use crate::error::RollupError;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProvisionOutcome {
    /// The index did not exist and a create request was issued
    pub created: bool,
    /// The backend acknowledged the creation (always true when not created)
    pub acknowledged: bool,
}

/// Make sure `index` exists, creating it (with optional settings/mappings)
/// when absent. Calling it again on an existing index is a no-op.
///
/// An unacknowledged creation is not fatal: writes may still succeed once
/// the cluster catches up, so it is logged and reported instead.
pub async fn ensure_index<B>(
    backend: &B,
    index: &str,
    mappings: Option<&Value>,
) -> Result<ProvisionOutcome, RollupError>
where
    B: SearchBackend + ?Sized,
{
    let provisioning = |source| RollupError::Provisioning {
        index: index.to_string(),
        source,
    };

    if backend.index_exists(index).await.map_err(provisioning)? {
        info!("Index {} already exists", index);
        return Ok(ProvisionOutcome {
            created: false,
            acknowledged: true,
        });
    }

    let receipt = backend
        .create_index(index, mappings)
        .await
        .map_err(provisioning)?;

    crate::metrics::INDEX_CREATED_TOTAL
        .with_label_values(&[if receipt.acknowledged { "true" } else { "false" }])
        .inc();
    crate::audit::index_created(index, receipt.acknowledged);

    if receipt.acknowledged {
        info!("Created index {}", index);
    } else {
        warn!(
            "Creation of index {} was not acknowledged; subsequent writes may fail",
            index
        );
    }

    Ok(ProvisionOutcome {
        created: true,
        acknowledged: receipt.acknowledged,
    })
}
