//! `almapipo retry` command implementation
//!
//! Picks up the identifiers that ended in `error` in an earlier job and runs
//! them again. The earlier job's rows are left as they are.

use anyhow::Result;

use almapipo_common::types::Job;
use almapipo_core::config::Config;
use almapipo_core::pipeline::{RunReport, Transform};

use super::{check_workflow_args, orchestrator};
use crate::WorkflowArgs;

pub async fn run(config: &Config, job: Job, from_job: Job, args: &WorkflowArgs) -> Result<RunReport> {
    check_workflow_args(args)?;

    let orchestrator = orchestrator(config, job, args).await?;
    let transform = args.transform();

    let report = orchestrator
        .retry_failed(
            from_job,
            &args.api,
            &args.kind,
            args.method,
            transform.as_ref().map(|t| t as &dyn Transform),
        )
        .await?;

    Ok(report)
}
