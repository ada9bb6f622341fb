//! Flush command implementation

use super::BackendArgs;
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use esrollup_aggregator::SearchBackend;

#[derive(Args, Debug)]
pub struct FlushArgs {
    /// Index to flush
    pub index: String,

    #[command(flatten)]
    pub backend: BackendArgs,
}

pub async fn run(args: FlushArgs) -> Result<()> {
    let config = args.backend.load_config()?;
    let backend = super::connect(&config)?;

    backend
        .flush(&args.index)
        .await
        .with_context(|| format!("Failed to flush {}", args.index))?;

    output::success(&format!("Flushed {}", args.index));
    Ok(())
}
