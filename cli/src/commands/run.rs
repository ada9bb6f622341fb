//! Run command implementation

use super::BackendArgs;
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use esrollup_aggregator::ids::IdStrategy;
use esrollup_aggregator::query::BucketOrder;
use esrollup_aggregator::{metrics, RollupPipeline};
use tracing::debug;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Index holding the raw events
    #[arg(short, long)]
    pub source_index: Option<String>,

    /// Index receiving the derived documents
    #[arg(short, long)]
    pub dest_index: Option<String>,

    /// Field to group on (e.g., "user.keyword")
    #[arg(short, long)]
    pub group_field: Option<String>,

    /// Timestamp field of the histogram
    #[arg(long)]
    pub time_field: Option<String>,

    /// Histogram interval (e.g., "week", "day", "30m")
    #[arg(short, long)]
    pub interval: Option<String>,

    /// Maximum number of groups
    #[arg(long)]
    pub size: Option<u32>,

    /// Group order: count_desc, count_asc, key_asc, key_desc
    #[arg(long)]
    pub order: Option<BucketOrder>,

    /// Field of the derived document carrying the group key
    #[arg(long)]
    pub key_field: Option<String>,

    /// Marker stored in every derived document
    #[arg(long)]
    pub marker: Option<String>,

    /// Document ids: sequential or content_hash
    #[arg(long)]
    pub id_strategy: Option<IdStrategy>,

    /// First sequential id
    #[arg(long)]
    pub id_seed: Option<u64>,

    /// Flush the source index before querying
    #[arg(long)]
    pub flush_source: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let mut config = args.backend.load_config()?;

    if let Some(v) = args.source_index {
        config.source_index = v;
    }
    if let Some(v) = args.dest_index {
        config.dest_index = v;
    }
    if let Some(v) = args.group_field {
        config.group_field = v;
    }
    if let Some(v) = args.time_field {
        config.time_field = v;
    }
    if let Some(v) = args.interval {
        config.interval = v;
    }
    if let Some(v) = args.size {
        config.bucket_size = v;
    }
    if let Some(v) = args.order {
        config.order = v;
    }
    if let Some(v) = args.key_field {
        config.key_field = v;
    }
    if let Some(v) = args.marker {
        config.marker = v;
    }
    if let Some(v) = args.id_strategy {
        config.id_strategy = v;
    }
    if let Some(v) = args.id_seed {
        config.id_seed = v;
    }
    config.flush_source |= args.flush_source;
    config.validate()?;

    debug!(
        "Rolling up {} by {} per {} into {}",
        config.source_index, config.group_field, config.interval, config.dest_index
    );

    let backend = super::connect(&config)?;
    let result = RollupPipeline::new(&backend, &config).run().await;

    if args.metrics {
        print!("{}", metrics::encode_metrics());
    }
    let report = result.context("Rollup failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    output::info(&format!(
        "Search backend at {} is running version {}",
        config.endpoint, report.backend_version
    ));
    if report.index_created {
        if report.index_acknowledged {
            output::success(&format!("Created index {}", config.dest_index));
        } else {
            output::warning(&format!(
                "Creation of index {} was not acknowledged",
                config.dest_index
            ));
        }
    }

    if report.data_absent {
        output::warning(&format!(
            "No {} aggregation in the response from {}; nothing written",
            config.outer_agg, config.source_index
        ));
        return Ok(());
    }

    for receipt in &report.written {
        println!(
            "Indexed document {} to index {}, type {}",
            receipt.id, receipt.index, config.doc_type
        );
    }
    if report.skipped_buckets > 0 {
        output::warning(&format!(
            "Skipped {} of {} groups with a non-text key",
            report.skipped_buckets, report.outer_buckets
        ));
    }
    output::success(&format!(
        "Wrote {} documents from {} groups to {}",
        report.written.len(),
        report.outer_buckets,
        config.dest_index
    ));

    Ok(())
}
