//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function. The helpers
//! here wire configuration, database and Alma client into an orchestrator.

pub mod ledger;
pub mod migrate;
pub mod remaining;
pub mod retry;
pub mod run;
pub mod set;

use anyhow::{bail, Result};
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use almapipo_common::types::Job;
use almapipo_core::config::Config;
use almapipo_core::db::{self, PgStore};
use almapipo_core::pipeline::{ConsistencyPolicy, Orchestrator, RunReport, Workflow};
use almapipo_core::rest::AlmaClient;

use crate::WorkflowArgs;

/// Connect to the ledger database and bring its schema up to date
pub async fn connect(config: &Config) -> Result<PgStore> {
    let pool = db::create_pool(&config.database).await?;
    db::migrate(&pool).await?;
    Ok(PgStore::new(pool))
}

pub fn client(config: &Config) -> Result<AlmaClient> {
    let alma = config.require_remote()?;
    Ok(AlmaClient::new(alma)?)
}

/// Reject flag combinations clap cannot express
pub fn check_workflow_args(args: &WorkflowArgs) -> Result<()> {
    let has_edits = !args.edits().is_empty();
    match args.method {
        Workflow::Put if !has_edits => {
            bail!("--method put needs at least one --remove-element or --replace-text")
        },
        Workflow::Put => Ok(()),
        _ if has_edits => bail!("--remove-element and --replace-text only apply to --method put"),
        _ => Ok(()),
    }
}

/// Build the orchestrator for a job from configuration and command-line flags
pub async fn orchestrator(config: &Config, job: Job, args: &WorkflowArgs) -> Result<Orchestrator> {
    let client = client(config)?;
    let store = connect(config).await?;

    let concurrency = args.concurrency.unwrap_or(config.pipeline.concurrency);
    let strict = args.strict || config.pipeline.strict_consistency;
    info!(job = %job, concurrency, strict, "Job created");

    Ok(Orchestrator::new(Arc::new(store), Arc::new(client), job)
        .with_concurrency(concurrency)
        .with_consistency(ConsistencyPolicy::from_strict(strict)))
}

/// Print a finished run for the user
pub fn print_report(report: &RunReport) {
    println!("{} {}", "Job:".cyan().bold(), report.job);
    for (action, counts) in &report.summaries {
        let line = format!("  {:<6} {}", action.as_str(), counts);
        if counts.error > 0 || counts.new > 0 {
            println!("{}", line.yellow());
        } else {
            println!("{}", line.green());
        }
    }
}
