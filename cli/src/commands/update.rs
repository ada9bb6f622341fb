//! Update command implementation

use super::BackendArgs;
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use esrollup_aggregator::{apply_update, ScriptedUpdate};
use serde_json::Value;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Index holding the document
    pub index: String,

    /// Document id
    pub id: String,

    /// Update script (e.g., "ctx._source.retweets += params.num")
    #[arg(short, long)]
    pub script: String,

    /// Script parameter as name=value; values are parsed as JSON, else taken as text
    #[arg(short, long = "param")]
    pub params: Vec<String>,

    /// Script language
    #[arg(long, default_value = "painless")]
    pub lang: String,

    /// JSON body inserted when the document does not exist
    #[arg(long)]
    pub upsert: Option<String>,

    /// Document type (defaults to the configured doc_type)
    #[arg(long)]
    pub doc_type: Option<String>,

    #[command(flatten)]
    pub backend: BackendArgs,
}

pub async fn run(args: UpdateArgs) -> Result<()> {
    let config = args.backend.load_config()?;
    let backend = super::connect(&config)?;
    let doc_type = args.doc_type.unwrap_or(config.doc_type);

    let mut update = ScriptedUpdate::new(args.script).lang(args.lang);
    for param in &args.params {
        let (name, value) = parse_param(param)?;
        update = update.param(name, value);
    }
    if let Some(upsert) = &args.upsert {
        let body: Value = serde_json::from_str(upsert).context("Failed to parse upsert body")?;
        update = update.upsert(body);
    }

    let outcome = apply_update(&backend, &args.index, &doc_type, &args.id, &update).await?;

    output::success(&format!(
        "Document {} in index {} {}; now at version {}",
        outcome.id, args.index, outcome.result, outcome.version
    ));
    Ok(())
}

fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid parameter {:?}, expected name=value", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.trim().to_string(), value))
}
