//! CLI for esrollup
//!
//! Commands:
//! - run: Roll up a terms → date histogram aggregation into derived documents
//! - ping: Check the search backend
//! - get: Print a single document
//! - update: Apply a scripted partial update to a single document
//! - flush: Flush an index

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "esrollup")]
#[command(about = "esrollup - aggregation rollups for Elasticsearch", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll up grouped time buckets into a destination index
    Run(commands::run::RunArgs),

    /// Check that the search backend is reachable
    Ping(commands::ping::PingArgs),

    /// Print a single document
    Get(commands::get::GetArgs),

    /// Apply a scripted partial update to a single document
    Update(commands::update::UpdateArgs),

    /// Flush an index
    Flush(commands::flush::FlushArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => {
            init_tracing(args.backend.verbose);
            commands::run::run(args).await
        }
        Commands::Ping(args) => {
            init_tracing(args.backend.verbose);
            commands::ping::run(args).await
        }
        Commands::Get(args) => {
            init_tracing(args.backend.verbose);
            commands::get::run(args).await
        }
        Commands::Update(args) => {
            init_tracing(args.backend.verbose);
            commands::update::run(args).await
        }
        Commands::Flush(args) => {
            init_tracing(args.backend.verbose);
            commands::flush::run(args).await
        }
    };

    if let Err(e) = result {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
