//! Fatal errors of the core library
//!
//! Only structural failures live here. Failures of a single identifier are
//! contained by the orchestrator and end up as `error` rows in the ledger.

use almapipo_common::types::Action;
use thiserror::Error;

use crate::db::StoreError;
use crate::rest::ApiError;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Input file missing, unreadable or of an unsupported type
    #[error("Input error: {0}")]
    Input(String),

    #[error("Unknown resource '{kind}' for api '{api}'")]
    UnknownResource { api: String, kind: String },

    #[error("Resource '{kind}' of api '{api}' does not support {action}")]
    UnsupportedMethod {
        api: String,
        kind: String,
        action: Action,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("PUT requires a transformation, none was given")]
    MissingTransform,

    /// Client setup or a call outside the per-record workflow failed
    #[error("Remote service error: {0}")]
    Remote(#[from] ApiError),

    #[error(transparent)]
    Common(#[from] almapipo_common::PipoError),
}

impl CoreError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn unknown_resource(api: &str, kind: &str) -> Self {
        Self::UnknownResource {
            api: api.to_string(),
            kind: kind.to_string(),
        }
    }
}

impl From<csv::Error> for CoreError {
    fn from(err: csv::Error) -> Self {
        Self::Input(err.to_string())
    }
}
