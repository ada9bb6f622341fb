//! Get command implementation

use super::BackendArgs;
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use esrollup_aggregator::SearchBackend;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Index to read from
    pub index: String,

    /// Document id
    pub id: String,

    /// Document type (defaults to the configured doc_type)
    #[arg(long)]
    pub doc_type: Option<String>,

    #[command(flatten)]
    pub backend: BackendArgs,
}

pub async fn run(args: GetArgs) -> Result<()> {
    let config = args.backend.load_config()?;
    let backend = super::connect(&config)?;
    let doc_type = args.doc_type.unwrap_or(config.doc_type);

    let receipt = backend
        .get(&args.index, &doc_type, &args.id)
        .await
        .with_context(|| format!("Failed to get document {} from {}", args.id, args.index))?;

    if !receipt.found {
        output::warning(&format!("Document {} not found in {}", args.id, args.index));
        return Ok(());
    }

    println!(
        "Got document {} in version {} from index {}, type {}",
        receipt.id,
        receipt.version.unwrap_or(0),
        receipt.index,
        receipt.doc_type
    );
    if let Some(source) = &receipt.source {
        println!("{}", serde_json::to_string_pretty(source)?);
    }

    Ok(())
}
