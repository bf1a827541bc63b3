//! Command-line entrypoint.
//!
//! `rustyindex index` runs one reconciliation and exits non-zero only when the run aborts;
//! skipped files are reported but still count as success. `rustyindex plan` prints what a run
//! would do without writing to the index.
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyindex::{config::Config, logging, sync::Reconciler};

#[derive(Parser)]
#[command(
    name = "rustyindex",
    about = "Keep a Qdrant collection in sync with a directory of documents"
)]
struct Cli {
    /// Print the result as JSON instead of a text summary.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the index with the source directory.
    Index,
    /// Show the reconciliation plan without changing anything.
    Plan,
}

#[tokio::main]
async fn main() -> ExitCode {
    // `.env` may carry RUST_LOG and the log file path, so it is read before logging starts.
    dotenvy::dotenv().ok();
    let _log_guard = logging::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "Run aborted");
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let reconciler =
        Reconciler::from_config(&config).context("failed to initialise reconciler")?;

    match cli.command {
        Command::Index => {
            let report = reconciler.process().await.context("reconciliation failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{}: {} ingested ({} chunks), {} deleted, {} unchanged",
                    report.status,
                    report.ingested.len(),
                    report.chunks_written(),
                    report.deleted.len(),
                    report.unchanged
                );
                for skip in &report.skipped {
                    println!("  skipped {}: {}", skip.filename, skip.reason);
                }
                for (name, error) in &report.delete_failures {
                    println!("  delete failed {name}: {error}");
                }
            }
        }
        Command::Plan => {
            let plan = reconciler.plan().await.context("planning failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!(
                    "{} to delete, {} to ingest ({} changed), {} unchanged",
                    plan.to_delete.len(),
                    plan.to_ingest.len(),
                    plan.changed.len(),
                    plan.unchanged
                );
                for name in &plan.to_delete {
                    println!("  - {name}");
                }
                for name in plan.to_ingest.keys() {
                    let marker = if plan.changed.contains(name) { '~' } else { '+' };
                    println!("  {marker} {name}");
                }
            }
        }
    }
    Ok(())
}
