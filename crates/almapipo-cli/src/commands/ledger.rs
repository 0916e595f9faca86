//! `almapipo report` and `almapipo ids` command implementations
//!
//! Read-only queries against the ledger of a past job.

use anyhow::Result;
use colored::Colorize;

use almapipo_common::types::{Action, EntryStatus, Job};
use almapipo_core::config::Config;
use almapipo_core::db::StatusLedger;

use super::connect;

/// Print the status counts of `action` in `job`
pub async fn report(config: &Config, job: Job, action: Action) -> Result<()> {
    let store = connect(config).await?;
    let counts = store.count_by_status(action, job).await?;

    if counts.total() == 0 {
        println!("No {} entries for job {}.", action, job);
        return Ok(());
    }

    println!("{} {}", "Job:".cyan().bold(), job);
    println!("  {:<6} {}", action.as_str(), counts);
    Ok(())
}

/// Print the identifiers of `job` with the given action and status, one per line
pub async fn ids(config: &Config, job: Job, action: Action, status: EntryStatus) -> Result<()> {
    let store = connect(config).await?;

    for record_id in store.list_identifiers(status, action, job).await? {
        println!("{}", record_id);
    }
    Ok(())
}
