//! `almapipo run` command implementation
//!
//! Processes the identifiers of an input file.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use almapipo_common::types::Job;
use almapipo_core::config::Config;
use almapipo_core::input::{IdValidator, IdentifierSource};
use almapipo_core::pipeline::{RunReport, Transform};

use super::{check_workflow_args, orchestrator};
use crate::WorkflowArgs;

pub async fn run(
    config: &Config,
    job: Job,
    input: &Path,
    validate: bool,
    args: &WorkflowArgs,
) -> Result<RunReport> {
    check_workflow_args(args)?;

    let validator = if validate {
        let suffix = config.alma.institutional_suffix.as_deref().unwrap_or_default();
        Some(IdValidator::new(suffix)?)
    } else {
        None
    };

    // Input problems are reported before any connection is made
    let mut source = IdentifierSource::open(input, validator)?;
    let orchestrator = orchestrator(config, job, args).await?;
    let transform = args.transform();

    info!(job = %job, input = %input.display(), "Processing input file");
    let report = orchestrator
        .run_for_list(
            source.by_ref(),
            &args.api,
            &args.kind,
            args.method,
            transform.as_ref().map(|t| t as &dyn Transform),
        )
        .await?;

    if source.discarded() > 0 {
        warn!(
            job = %job,
            discarded = source.discarded(),
            "Rows with invalid identifiers were skipped"
        );
    }

    Ok(report)
}
