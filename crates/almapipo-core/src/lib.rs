//! almapipo core library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Drives batches of record identifiers through GET, PUT, POST and DELETE
//! calls against the Alma REST API and keeps a per-job ledger of what was
//! attempted and how it went.
//!
//! # Components
//!
//! - [`input`]: reads identifiers from `.csv`/`.tsv` files
//! - [`rest`]: the remote record client and the resource dispatch table
//! - [`db`]: the status ledger and record archive (PostgreSQL or in memory)
//! - [`pipeline`]: the orchestrator, the consistency checker and transforms
//! - [`xml`]: small XML helpers used for normalisation and transforms
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use almapipo_common::types::Job;
//! use almapipo_core::{
//!     config::Config,
//!     db::{self, PgStore},
//!     input::IdentifierSource,
//!     pipeline::{Orchestrator, Workflow},
//!     rest::AlmaClient,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let pool = db::create_pool(&config.database).await?;
//! db::migrate(&pool).await?;
//!
//! let client = AlmaClient::new(&config.alma)?;
//! let orchestrator = Orchestrator::new(Arc::new(PgStore::new(pool)), Arc::new(client), Job::now());
//!
//! let source = IdentifierSource::open("ids.csv", None)?;
//! let report = orchestrator.run_for_list(source, "bibs", "holdings", Workflow::Get, None).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod input;
pub mod pipeline;
pub mod rest;
pub mod xml;

pub use error::{CoreError, CoreResult};
