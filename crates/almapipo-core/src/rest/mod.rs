//! Remote record client
//!
//! [`RecordClient`] is the seam between the orchestrator and the Alma REST
//! API. Every call addresses a path relative to the API base URL, built from
//! the [`resources`] dispatch table, and yields the raw XML payload.

use async_trait::async_trait;
use thiserror::Error;

use almapipo_common::types::RecordId;

pub mod client;
pub mod resources;
pub mod sets;

pub use client::AlmaClient;
pub use resources::{ResourceDescriptor, ResourceTable};

/// Failure of a single remote call
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport failure, including the per-call deadline
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {code} (expected {expected}): {body}")]
    Status { code: u16, expected: u16, body: String },

    #[error("Empty response")]
    EmptyResponse,

    #[error(transparent)]
    InvalidXml(#[from] crate::xml::XmlError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid API key header: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl ApiError {
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }
}

/// One HTTP request per call; paths are relative to the API base URL
#[async_trait]
pub trait RecordClient: Send + Sync {
    async fn retrieve(&self, path: &str) -> Result<String, ApiError>;

    /// POST a payload to a collection path
    async fn create(&self, path: &str, payload: &str) -> Result<String, ApiError>;

    async fn update(&self, path: &str, payload: &str) -> Result<String, ApiError>;

    async fn delete(&self, path: &str) -> Result<String, ApiError>;

    /// Resolve a set to the record ids of its members
    async fn set_members(&self, set_id: &str) -> Result<Vec<RecordId>, ApiError>;

    /// Calls left under the daily API request threshold
    async fn calls_remaining(&self) -> Result<u64, ApiError>;
}
