//! almapipo CLI - Main entry point

use almapipo_cli::{commands, Cli, Commands};
use almapipo_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use almapipo_common::types::Job;
use almapipo_core::config::Config;
use clap::Parser;
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let job = Job::now();

    // Job commands log to the console and to a file named after the job
    let mut builder = LogConfig::builder().level(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });
    if cli.command.starts_job() {
        builder = builder.output(LogOutput::Both).job(&job);
    }

    // Environment variables take precedence
    let guard = match builder
        .build()
        .with_env_overrides()
        .and_then(|config| init_logging(&config).map(|guard| (config, guard)))
    {
        Ok((config, guard)) => {
            if config.output.writes_file() {
                info!(job = %job, log_file = %config.log_file_path().display(), "Logging to file");
            }
            Some(guard)
        },
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        },
    };

    if let Err(e) = execute_command(&cli, job).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        // Flush the log file before exiting
        drop(guard);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli, job: Job) -> anyhow::Result<()> {
    let config = Config::load()?;

    match &cli.command {
        Commands::Run {
            input,
            validate,
            workflow,
        } => {
            let report = commands::run::run(&config, job, input, *validate, workflow).await?;
            info!(job = %job, clean = report.is_clean(), "Run finished");
            commands::print_report(&report);
        },

        Commands::Set { set_id, workflow } => {
            let report = commands::set::run(&config, job, set_id, workflow).await?;
            info!(job = %job, clean = report.is_clean(), "Set run finished");
            commands::print_report(&report);
        },

        Commands::Retry { from_job, workflow } => {
            let report = commands::retry::run(&config, job, *from_job, workflow).await?;
            info!(job = %job, previous = %from_job, clean = report.is_clean(), "Retry finished");
            commands::print_report(&report);
        },

        Commands::Report { job, action } => {
            commands::ledger::report(&config, *job, *action).await?
        },

        Commands::Ids {
            job,
            action,
            status,
        } => commands::ledger::ids(&config, *job, *action, *status).await?,

        Commands::Remaining => commands::remaining::run(&config).await?,

        Commands::Migrate => commands::migrate::run(&config).await?,
    }

    Ok(())
}
