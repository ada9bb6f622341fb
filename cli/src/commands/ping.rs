//! Ping command implementation

use super::BackendArgs;
use anyhow::{Context, Result};
use clap::Args;
use esrollup_aggregator::SearchBackend;

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
}

pub async fn run(args: PingArgs) -> Result<()> {
    let config = args.backend.load_config()?;
    let backend = super::connect(&config)?;

    let info = backend
        .ping()
        .await
        .with_context(|| format!("Failed to reach {}", config.endpoint))?;

    println!(
        "Search backend at {} returned with code {} and version {}",
        config.endpoint, info.status_code, info.version
    );
    if let Some(cluster) = &info.cluster_name {
        println!("  cluster: {}", cluster);
    }

    Ok(())
}
