//! almapipo Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the almapipo workspace.
//!
//! # Overview
//!
//! - **Types**: job identifiers, actions, ledger statuses and composite record ids
//! - **Error Handling**: the common error type and result alias
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use almapipo_common::types::{Action, Job, RecordId};
//!
//! fn main() -> almapipo_common::Result<()> {
//!     let job = Job::now();
//!     let id: RecordId = "9912345678904161,2212345678904161".parse()?;
//!     let action: Action = "delete".parse()?;
//!     println!("{job} {id} {action}");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PipoError, Result};
