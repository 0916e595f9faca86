//! `almapipo set` command implementation

use anyhow::Result;

use almapipo_common::types::Job;
use almapipo_core::config::Config;
use almapipo_core::pipeline::{RunReport, Transform};

use super::{check_workflow_args, orchestrator};
use crate::WorkflowArgs;

/// Process every member of `set_id`
pub async fn run(config: &Config, job: Job, set_id: &str, args: &WorkflowArgs) -> Result<RunReport> {
    check_workflow_args(args)?;

    let orchestrator = orchestrator(config, job, args).await?;
    let transform = args.transform();

    let report = orchestrator
        .run_for_set(
            set_id,
            &args.api,
            &args.kind,
            args.method,
            transform.as_ref().map(|t| t as &dyn Transform),
        )
        .await?;

    Ok(report)
}
