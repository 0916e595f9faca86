//! almapipo CLI Library
//!
//! Command-line interface for batch record operations against the Alma REST
//! API, tracked per identifier in the job ledger.
//!
//! # Overview
//!
//! - **Batch runs**: process the identifiers of a CSV/TSV file (`almapipo run`)
//!   or the members of an Alma set (`almapipo set`)
//! - **Follow-up**: retry the failures of a past job (`almapipo retry`), show
//!   its counts (`almapipo report`) or list identifiers by status (`almapipo ids`)
//! - **Housekeeping**: check the daily API quota (`almapipo remaining`) and
//!   apply database migrations (`almapipo migrate`)

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use almapipo_common::types::{Action, EntryStatus, Job};
use almapipo_core::pipeline::{Workflow, XmlEdit, XmlEdits};

/// almapipo - batch record operations against the Alma REST API
#[derive(Parser, Debug)]
#[command(name = "almapipo")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process every identifier of a CSV (';') or TSV file
    Run {
        /// Input file; the first column holds the (comma separated) record id
        #[arg(short, long)]
        input: PathBuf,

        /// Discard ids that do not look like ids of this institution
        #[arg(long)]
        validate: bool,

        #[command(flatten)]
        workflow: WorkflowArgs,
    },

    /// Process every member of an Alma set
    Set {
        /// Set id
        #[arg(long)]
        set_id: String,

        #[command(flatten)]
        workflow: WorkflowArgs,
    },

    /// Re-run the failed identifiers of a previous job under a new job
    Retry {
        /// Job timestamp of the previous run (RFC 3339)
        #[arg(long, value_parser = parse_job)]
        from_job: Job,

        #[command(flatten)]
        workflow: WorkflowArgs,
    },

    /// Show status counts of a past job
    Report {
        /// Job timestamp (RFC 3339)
        #[arg(long, value_parser = parse_job)]
        job: Job,

        /// get, put, post or delete
        #[arg(long, value_parser = parse_action)]
        action: Action,
    },

    /// List the identifiers of a past job with a given status, one per line
    Ids {
        /// Job timestamp (RFC 3339)
        #[arg(long, value_parser = parse_job)]
        job: Job,

        /// get, put, post or delete
        #[arg(long, value_parser = parse_action)]
        action: Action,

        /// new, done or error
        #[arg(long, value_parser = parse_status)]
        status: EntryStatus,
    },

    /// Show how many API calls are left for today
    Remaining,

    /// Apply pending database migrations
    Migrate,
}

impl Commands {
    /// Whether the command opens a new job (and its own log file)
    pub fn starts_job(&self) -> bool {
        matches!(
            self,
            Commands::Run { .. } | Commands::Set { .. } | Commands::Retry { .. }
        )
    }
}

/// What to do with each record
#[derive(Args, Debug, Clone)]
pub struct WorkflowArgs {
    /// API area, e.g. bibs, electronic, users, acq, conf
    #[arg(long)]
    pub api: String,

    /// Record kind within the API, e.g. holdings, items, portfolios
    #[arg(long)]
    pub kind: String,

    /// get, put, delete, or post (restore from the latest archived snapshot)
    #[arg(short, long, value_parser = parse_workflow)]
    pub method: Workflow,

    /// PUT: remove this child element of the record root (repeatable)
    #[arg(long = "remove-element", value_name = "TAG")]
    pub remove_elements: Vec<String>,

    /// PUT: replace the text of this child element of the record root (repeatable)
    #[arg(long = "replace-text", value_name = "TAG=VALUE", value_parser = XmlEdit::parse_replacement)]
    pub replacements: Vec<XmlEdit>,

    /// Mark PUT/POST as error when Alma's answer differs from what was sent
    #[arg(long)]
    pub strict: bool,

    /// Number of records processed at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl WorkflowArgs {
    /// Edits given on the command line, removals first
    pub fn edits(&self) -> XmlEdits {
        let edits = self
            .remove_elements
            .iter()
            .map(|tag| XmlEdit::RemoveElement(tag.clone()))
            .chain(self.replacements.iter().cloned())
            .collect();
        XmlEdits::new(edits)
    }

    /// The transformation for a PUT run, if any edit was given
    pub fn transform(&self) -> Option<XmlEdits> {
        Some(self.edits()).filter(|edits| !edits.is_empty())
    }
}

fn parse_job(s: &str) -> Result<Job, String> {
    s.parse().map_err(|e: almapipo_common::PipoError| e.to_string())
}

fn parse_action(s: &str) -> Result<Action, String> {
    s.parse().map_err(|e: almapipo_common::PipoError| e.to_string())
}

fn parse_status(s: &str) -> Result<EntryStatus, String> {
    s.parse().map_err(|e: almapipo_common::PipoError| e.to_string())
}

fn parse_workflow(s: &str) -> Result<Workflow, String> {
    s.parse().map_err(|e: almapipo_common::PipoError| e.to_string())
}
